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

//! Installed version discovery

use crate::version::Version;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// Reports the version of an installed binary.
///
/// `None` means "unknown": either nothing is installed or the binary did not report a
/// usable version. Both cases make the orchestrator treat the install as outdated.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn current_version(&self, binary: &Path) -> Option<Version>;
}

/// Runs `<binary> <version_arg>` and parses its output
#[derive(Debug, Clone)]
pub struct BinaryVersionProbe {
    version_arg: String,
    timeout: Duration,
}

impl BinaryVersionProbe {
    pub fn new(version_arg: impl Into<String>, timeout: Duration) -> Self {
        Self {
            version_arg: version_arg.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VersionProbe for BinaryVersionProbe {
    async fn current_version(&self, binary: &Path) -> Option<Version> {
        if !binary.exists() {
            tracing::info!("No installed binary at {}", binary.display());
            return None;
        }

        let output = tokio::process::Command::new(binary)
            .arg(&self.version_arg)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Failed to run {} {}: {e}", binary.display(), self.version_arg);
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    "{} {} did not finish within {:?}",
                    binary.display(),
                    self.version_arg,
                    self.timeout
                );
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!("{} exited with {}", binary.display(), output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_version_output(&stdout, &stderr)
    }
}

/// Extract a version from command output, preferring stdout
pub fn parse_version_output(stdout: &str, stderr: &str) -> Option<Version> {
    match Version::find_in(stdout).or_else(|_| Version::find_in(stderr)) {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::warn!("Installed binary reported no usable version: {e}");
            None
        }
    }
}

/// Probe that always reports the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedVersionProbe(pub Option<Version>);

#[async_trait]
impl VersionProbe for FixedVersionProbe {
    async fn current_version(&self, _binary: &Path) -> Option<Version> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_output_stdout() {
        assert_eq!(
            parse_version_output("fluxion 1.2.3\n", ""),
            Some(Version::new(1, 2, 3))
        );
    }

    #[test]
    fn test_parse_version_output_falls_back_to_stderr() {
        assert_eq!(
            parse_version_output("", "fluxion version v0.2.38"),
            Some(Version::new(0, 2, 38))
        );
    }

    #[test]
    fn test_parse_version_output_garbage() {
        assert_eq!(parse_version_output("usage: fluxion [OPTIONS]", "unknown flag"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let probe = BinaryVersionProbe::new("--version", Duration::from_secs(5));
        assert_eq!(probe.current_version(&dir.path().join("fluxion")).await, None);
    }

    #[tokio::test]
    async fn test_unrunnable_binary_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let binary = dir.path().join("fluxion");
        // Plain data without execute permission
        std::fs::write(&binary, b"not an executable").unwrap();

        let probe = BinaryVersionProbe::new("--version", Duration::from_secs(5));
        assert_eq!(probe.current_version(&binary).await, None);
    }

    #[tokio::test]
    async fn test_fixed_probe() {
        let probe = FixedVersionProbe(Some(Version::new(1, 2, 3)));
        assert_eq!(
            probe.current_version(Path::new("/nonexistent")).await,
            Some(Version::new(1, 2, 3))
        );
        assert_eq!(
            FixedVersionProbe(None)
                .current_version(Path::new("/nonexistent"))
                .await,
            None
        );
    }
}
