// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Main updater that orchestrates the update process
//!
//! One [`Updater::run`] walks the states below, strictly in sequence:
//!
//! ```text
//! CheckingVersions -> UpToDate | UpdateAvailable | AwaitingConfirmation
//! AwaitingConfirmation -> Cancelled | Downloading
//! Downloading -> Failed | Stopping -> BackingUp -> Swapping
//! Swapping -> Starting | RollingBack -> Starting
//! Starting -> Succeeded | Failed
//! ```
//!
//! Once the service has been stopped it is always started again, whatever happened
//! to the binary in between.

use crate::config::UpdaterConfig;
use crate::confirm::{Confirm, FixedAnswer, StdinConfirm};
use crate::downloader::{ArtifactFetcher, HttpDownloader};
use crate::error::{Result, UpdaterError};
use crate::install::{BackupOutcome, Installation};
use crate::lock::InstallLock;
use crate::probe::{BinaryVersionProbe, VersionProbe};
use crate::release_checker::{GithubReleaseSource, ReleaseArtifact, ReleaseSource};
use crate::service::{ServiceControl, StartOutcome, SystemServiceController};
use crate::telemetry::{UpdateEvent, report_event};
use crate::version::Version;
use std::fmt;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    CheckingVersions,
    UpToDate,
    UpdateAvailable,
    AwaitingConfirmation,
    Cancelled,
    Downloading,
    Stopping,
    BackingUp,
    Swapping,
    RollingBack,
    Starting,
    Succeeded,
    Failed,
}

impl UpdateState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::UpToDate
                | Self::UpdateAvailable
                | Self::Cancelled
                | Self::Succeeded
                | Self::Failed
        )
    }
}

/// Result of a run that ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub state: UpdateState,
    /// Installed version before the run, `None` when unknown or not installed
    pub current: Option<Version>,
    pub latest: Version,
    /// Version reported by the live binary after the run
    pub observed: Option<Version>,
    /// Set when the run went through `Starting`
    pub start: Option<StartOutcome>,
}

impl UpdateReport {
    fn unchanged(state: UpdateState, current: Option<Version>, latest: Version) -> Self {
        Self {
            state,
            current,
            latest,
            observed: current,
            start: None,
        }
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self
            .current
            .map_or_else(|| "not installed".to_string(), |v| v.to_string());

        match self.state {
            UpdateState::UpToDate => write!(f, "Already on latest version {}", self.latest),
            UpdateState::UpdateAvailable => {
                write!(f, "Update available: {current} -> {}", self.latest)
            }
            UpdateState::Cancelled => write!(f, "Update to {} cancelled", self.latest),
            UpdateState::Succeeded => {
                write!(
                    f,
                    "Updated to {} (installed binary reports {})",
                    self.latest,
                    describe(self.observed)
                )?;
                match &self.start {
                    Some(StartOutcome::Started) | None => Ok(()),
                    Some(StartOutcome::ManualStartRequired) => {
                        write!(f, "; start the service manually")
                    }
                    Some(StartOutcome::Failed(_)) => {
                        write!(f, "; service failed to start, check its logs")
                    }
                }
            }
            state => write!(f, "Update to {} ended in {state:?}", self.latest),
        }
    }
}

/// A run that ended in error, with the versions it was dealing with
#[derive(Debug)]
pub struct UpdateFailure {
    pub error: UpdaterError,
    /// Version being installed, `None` when the run failed before choosing one
    pub target: Option<Version>,
    /// Version reported by the live binary when the run ended
    pub observed: Option<Version>,
}

impl UpdateFailure {
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

impl From<UpdaterError> for UpdateFailure {
    fn from(error: UpdaterError) -> Self {
        Self {
            error,
            target: None,
            observed: None,
        }
    }
}

impl fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed = describe(self.observed);
        match self.target {
            Some(target) => write!(f, "target {target}, installed binary reports {observed}"),
            None => write!(f, "no target version, installed binary reports {observed}"),
        }
    }
}

impl std::error::Error for UpdateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn describe(version: Option<Version>) -> String {
    version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

/// Composes release lookup, download, service control and the binary swap
pub struct Updater {
    config: UpdaterConfig,
    installation: Installation,
    releases: Box<dyn ReleaseSource>,
    probe: Box<dyn VersionProbe>,
    fetcher: Box<dyn ArtifactFetcher>,
    service: Box<dyn ServiceControl>,
    confirm: Box<dyn Confirm>,
    state: UpdateState,
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("installation", &self.installation)
            .field("force", &self.config.force)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Updater {
    pub fn new(
        config: UpdaterConfig,
        releases: Box<dyn ReleaseSource>,
        probe: Box<dyn VersionProbe>,
        fetcher: Box<dyn ArtifactFetcher>,
        service: Box<dyn ServiceControl>,
        confirm: Box<dyn Confirm>,
    ) -> Self {
        let installation = Installation::new(&config.install_path, &config.executable_name());
        Self {
            config,
            installation,
            releases,
            probe,
            fetcher,
            service,
            confirm,
            state: UpdateState::CheckingVersions,
        }
    }

    /// Wire up the production collaborators for `config`
    pub async fn from_config(config: UpdaterConfig) -> Result<Self> {
        config.validate()?;

        let releases = GithubReleaseSource::new(&config)?;
        let probe = BinaryVersionProbe::new(config.version_arg.clone(), config.command_timeout());
        let fetcher = HttpDownloader::new(&config)?;
        let service = SystemServiceController::detect(&config).await;
        let confirm: Box<dyn Confirm> = if config.assume_yes {
            Box::new(FixedAnswer(true))
        } else {
            Box::new(StdinConfirm)
        };

        Ok(Self::new(
            config,
            Box::new(releases),
            Box::new(probe),
            Box::new(fetcher),
            Box::new(service),
            confirm,
        ))
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    fn transition(&mut self, next: UpdateState) {
        tracing::debug!("Update state: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    fn binary_path(&self) -> PathBuf {
        self.installation.binary_path.clone()
    }

    /// Run one update check, and the update itself when one is due and approved
    pub async fn run(&mut self) -> std::result::Result<UpdateReport, UpdateFailure> {
        // Check-only runs change nothing, not even the install dir
        let _lock = if self.config.check_only {
            None
        } else {
            Some(InstallLock::acquire(&self.installation.install_dir).await?)
        };
        self.state = UpdateState::CheckingVersions;

        let latest = match self.releases.latest_version().await {
            Ok(version) => version,
            Err(e) => {
                self.transition(UpdateState::Failed);
                error!("Could not determine the latest release: {e}");
                return Err(e.into());
            }
        };
        let current = self.probe.current_version(&self.binary_path()).await;

        match current {
            Some(current) => info!("Installed version: {current}, latest release: {latest}"),
            None => info!("Installed version unknown, latest release: {latest}"),
        }

        if current == Some(latest) && (self.config.check_only || !self.config.force) {
            self.transition(UpdateState::UpToDate);
            info!("Already on latest version: {latest}");
            return Ok(UpdateReport::unchanged(UpdateState::UpToDate, current, latest));
        }

        if self.config.check_only {
            self.transition(UpdateState::UpdateAvailable);
            return Ok(UpdateReport::unchanged(UpdateState::UpdateAvailable, current, latest));
        }

        self.transition(UpdateState::AwaitingConfirmation);
        if self.config.force {
            info!("Forced update to {latest}, skipping confirmation");
        } else if !self.confirm.confirm(&confirmation_question(current, latest)).await {
            self.transition(UpdateState::Cancelled);
            info!("Update to {latest} cancelled");
            return Ok(UpdateReport::unchanged(UpdateState::Cancelled, current, latest));
        }

        let artifact = self.releases.artifact_for(&latest);
        let result = self.install(&artifact, current).await;
        self.fetcher.cleanup(&artifact).await;
        result
    }

    async fn install(
        &mut self,
        artifact: &ReleaseArtifact,
        current: Option<Version>,
    ) -> std::result::Result<UpdateReport, UpdateFailure> {
        let target = artifact.version;
        let started_at = Instant::now();
        report_event(&UpdateEvent::UpdateStarted {
            from_version: current,
            to_version: target,
        });

        self.transition(UpdateState::Downloading);
        let new_binary = match self.fetcher.fetch_and_extract(artifact).await {
            Ok(path) => path,
            Err(e) => {
                self.transition(UpdateState::Failed);
                error!("Update to {target} failed before touching the installation: {e}");
                report_event(&UpdateEvent::UpdateFailed {
                    from_version: current,
                    to_version: target,
                    error: e.to_string(),
                });
                return Err(UpdateFailure {
                    error: e,
                    target: Some(target),
                    observed: current,
                });
            }
        };

        self.transition(UpdateState::Stopping);
        self.service.stop().await;

        self.transition(UpdateState::BackingUp);
        let replaced = match self.installation.create_backup().await {
            Ok(backup) => {
                self.transition(UpdateState::Swapping);
                match self.installation.replace_binary(&new_binary).await {
                    Ok(()) => {
                        info!(
                            "Installed {} as {}",
                            new_binary.display(),
                            self.binary_path().display()
                        );
                        Ok(())
                    }
                    Err(swap_err) => Err(self.roll_back(backup, swap_err, current, target).await),
                }
            }
            Err(e) => {
                error!("Backup failed, leaving the installed binary untouched: {e}");
                Err(e)
            }
        };

        self.transition(UpdateState::Starting);
        let start = self.service.start().await;
        let observed = self.probe.current_version(&self.binary_path()).await;

        match replaced {
            Ok(()) => {
                self.transition(UpdateState::Succeeded);
                if observed != Some(target) {
                    warn!(
                        "Installed binary reports {} after updating to {target}",
                        describe(observed)
                    );
                }
                report_event(&UpdateEvent::UpdateCompleted {
                    from_version: current,
                    to_version: target,
                    duration_secs: started_at.elapsed().as_secs(),
                });
                Ok(UpdateReport {
                    state: UpdateState::Succeeded,
                    current,
                    latest: target,
                    observed,
                    start: Some(start),
                })
            }
            Err(e) => {
                self.transition(UpdateState::Failed);
                error!(
                    "Update to {target} failed, installed binary reports {}",
                    describe(observed)
                );
                report_event(&UpdateEvent::UpdateFailed {
                    from_version: current,
                    to_version: target,
                    error: e.to_string(),
                });
                Err(UpdateFailure {
                    error: e,
                    target: Some(target),
                    observed,
                })
            }
        }
    }

    /// Restore the pre-update binary. Returns the error the run should end with.
    async fn roll_back(
        &mut self,
        backup: BackupOutcome,
        swap_err: UpdaterError,
        current: Option<Version>,
        target: Version,
    ) -> UpdaterError {
        self.transition(UpdateState::RollingBack);
        warn!("{swap_err}; rolling back");
        report_event(&UpdateEvent::RollbackStarted {
            from_version: target,
            to_version: current,
        });

        match self.installation.rollback(backup).await {
            Ok(()) => {
                report_event(&UpdateEvent::RollbackCompleted {
                    restored_version: current,
                });
                swap_err
            }
            Err(rollback_err) => {
                error!(
                    "Rollback failed, {} may be inconsistent: {rollback_err}",
                    self.binary_path().display()
                );
                report_event(&UpdateEvent::RollbackFailed {
                    error: rollback_err.to_string(),
                });
                UpdaterError::RollbackFailed {
                    swap: swap_err.to_string(),
                    rollback: rollback_err.to_string(),
                }
            }
        }
    }
}

fn confirmation_question(current: Option<Version>, latest: Version) -> String {
    match current {
        None => format!("Install fluxion {latest}?"),
        Some(current) if current > latest => {
            format!("Installed {current} is newer than latest release {latest}. Downgrade?")
        }
        Some(current) => format!("Update fluxion from {current} to {latest}?"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(UpdateState::UpToDate.is_terminal());
        assert!(UpdateState::Cancelled.is_terminal());
        assert!(UpdateState::Succeeded.is_terminal());
        assert!(UpdateState::Failed.is_terminal());
        assert!(!UpdateState::Swapping.is_terminal());
        assert!(!UpdateState::RollingBack.is_terminal());
    }

    #[test]
    fn test_confirmation_question() {
        let latest = Version::new(1, 3, 0);
        assert_eq!(confirmation_question(None, latest), "Install fluxion 1.3.0?");
        assert_eq!(
            confirmation_question(Some(Version::new(1, 2, 3)), latest),
            "Update fluxion from 1.2.3 to 1.3.0?"
        );
        assert!(
            confirmation_question(Some(Version::new(2, 0, 0)), latest).contains("Downgrade")
        );
    }

    #[test]
    fn test_failure_names_target_and_observed() {
        let failure = UpdateFailure {
            error: UpdaterError::Swap("disk full".to_string()),
            target: Some(Version::new(1, 3, 0)),
            observed: Some(Version::new(1, 2, 3)),
        };
        assert_eq!(failure.to_string(), "target 1.3.0, installed binary reports 1.2.3");
        assert_eq!(failure.exit_code(), 1);
        let source = std::error::Error::source(&failure).unwrap();
        assert!(source.to_string().contains("disk full"));

        let failure = UpdateFailure::from(UpdaterError::Network("refused".to_string()));
        assert_eq!(failure.to_string(), "no target version, installed binary reports unknown");
    }

    #[test]
    fn test_report_summary() {
        let report = UpdateReport {
            state: UpdateState::Succeeded,
            current: Some(Version::new(1, 2, 3)),
            latest: Version::new(1, 3, 0),
            observed: Some(Version::new(1, 3, 0)),
            start: Some(StartOutcome::ManualStartRequired),
        };
        let summary = report.to_string();
        assert!(summary.starts_with("Updated to 1.3.0"));
        assert!(summary.contains("manually"));

        let report =
            UpdateReport::unchanged(UpdateState::UpdateAvailable, None, Version::new(1, 3, 0));
        assert_eq!(report.to_string(), "Update available: not installed -> 1.3.0");

        let report = UpdateReport::unchanged(
            UpdateState::UpToDate,
            Some(Version::new(1, 3, 0)),
            Version::new(1, 3, 0),
        );
        assert_eq!(report.to_string(), "Already on latest version 1.3.0");
    }
}
