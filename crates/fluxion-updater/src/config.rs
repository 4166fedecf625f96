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

//! Configuration module for the updater
//!
//! The configuration is an explicit value handed to [`crate::Updater::new`]. It can be
//! read from a JSON file and is then overridden by command line flags.

use crate::error::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "fluxion";
pub const DEFAULT_BINARY_NAME: &str = "fluxion";
pub const DEFAULT_ARTIFACT_URL_TEMPLATE: &str =
    "https://github.com/{repo}/releases/download/{tag}/fluxion-{version}-{target}.zip";

#[cfg(windows)]
const DEFAULT_INSTALL_PATH: &str = r"C:\Program Files\FluxION";
#[cfg(not(windows))]
const DEFAULT_INSTALL_PATH: &str = "/opt/fluxion";

fn default_install_path() -> PathBuf {
    PathBuf::from(DEFAULT_INSTALL_PATH)
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_binary_name() -> String {
    DEFAULT_BINARY_NAME.to_string()
}

fn default_artifact_url_template() -> String {
    DEFAULT_ARTIFACT_URL_TEMPLATE.to_string()
}

fn default_version_arg() -> String {
    "--version".to_string()
}

fn default_60() -> u64 {
    60
}

fn default_30() -> u64 {
    30
}

fn default_3() -> u64 {
    3
}

fn default_retry_delays() -> Vec<u64> {
    vec![1, 5, 30]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Directory holding the live binary and its `.bak` backup
    #[serde(default = "default_install_path")]
    pub install_path: PathBuf,

    /// Name of the OS-managed service wrapping the binary
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Executable name without platform suffix
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Skip the up-to-date check and the confirmation prompt
    #[serde(default)]
    pub force: bool,

    /// Only report whether an update is available
    #[serde(default)]
    pub check_only: bool,

    /// Answer the confirmation prompt with yes
    #[serde(default)]
    pub assume_yes: bool,

    /// Which release channel to track: "stable", "nightly", "staging"
    #[serde(default)]
    pub release_channel: ReleaseChannel,

    /// GitHub token for the private staging channel (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_token: Option<String>,

    /// Custom API base URL for testing (overrides default GitHub API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Download URL pattern; `{version}`, `{tag}`, `{repo}` and `{target}` are substituted
    #[serde(default = "default_artifact_url_template")]
    pub artifact_url_template: String,

    /// Where archives are downloaded and extracted (defaults to the system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    /// Argument that makes the binary print its version
    #[serde(default = "default_version_arg")]
    pub version_arg: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_60")]
    pub http_timeout_secs: u64,

    /// Timeout for service manager and version probe commands (seconds)
    #[serde(default = "default_30")]
    pub command_timeout_secs: u64,

    /// Pause after a graceful stop and after force-killing leftovers (seconds)
    #[serde(default = "default_3")]
    pub stop_grace_secs: u64,

    /// Delay before each download retry (seconds); empty means a single attempt
    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Staging,
    Nightly,
    #[default]
    Stable,
}

impl ReleaseChannel {
    pub fn github_repo(&self) -> &str {
        match self {
            Self::Staging => "SolarE-cz/fluxion-staging",
            Self::Nightly => "SolarE-cz/fluxion-nightly",
            Self::Stable => "SolarE-cz/fluxion",
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Staging)
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            install_path: default_install_path(),
            service_name: default_service_name(),
            binary_name: default_binary_name(),
            force: false,
            check_only: false,
            assume_yes: false,
            release_channel: ReleaseChannel::default(),
            release_token: None,
            api_base_url: None,
            artifact_url_template: default_artifact_url_template(),
            staging_dir: None,
            version_arg: default_version_arg(),
            http_timeout_secs: 60,
            command_timeout_secs: 30,
            stop_grace_secs: 3,
            retry_delays_secs: default_retry_delays(),
        }
    }
}

impl UpdaterConfig {
    /// File name of the live binary, including the platform suffix
    pub fn executable_name(&self) -> String {
        format!("{}{}", self.binary_name, std::env::consts::EXE_SUFFIX)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("fluxion-updater"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(UpdaterError::Config("service_name must not be empty".to_string()));
        }
        if self.binary_name.trim().is_empty() || self.binary_name.contains(['/', '\\']) {
            return Err(UpdaterError::Config(format!(
                "binary_name must be a plain file name, got {:?}",
                self.binary_name
            )));
        }
        if !self.artifact_url_template.contains("{version}")
            && !self.artifact_url_template.contains("{tag}")
        {
            return Err(UpdaterError::Config(
                "artifact_url_template must contain {version} or {tag}".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 || self.command_timeout_secs == 0 {
            return Err(UpdaterError::Config("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Load configuration from a JSON file, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<UpdaterConfig> {
    let Some(path) = path else {
        return Ok(UpdaterConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        UpdaterError::Config(format!("Failed to read config {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| UpdaterError::Config(format!("Failed to parse config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = UpdaterConfig::default();
        assert_eq!(config.install_path, PathBuf::from(DEFAULT_INSTALL_PATH));
        assert_eq!(config.service_name, "fluxion");
        assert_eq!(config.binary_name, "fluxion");
        assert!(!config.force);
        assert!(!config.check_only);
        assert_eq!(config.release_channel, ReleaseChannel::Stable);
        assert_eq!(config.retry_delays_secs, vec![1, 5, 30]);
        assert!(config.release_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_to_repo_mapping() {
        assert_eq!(
            ReleaseChannel::Staging.github_repo(),
            "SolarE-cz/fluxion-staging"
        );
        assert_eq!(
            ReleaseChannel::Nightly.github_repo(),
            "SolarE-cz/fluxion-nightly"
        );
        assert_eq!(ReleaseChannel::Stable.github_repo(), "SolarE-cz/fluxion");
    }

    #[test]
    fn test_is_private() {
        assert!(ReleaseChannel::Staging.is_private());
        assert!(!ReleaseChannel::Nightly.is_private());
        assert!(!ReleaseChannel::Stable.is_private());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            r#"{"install_path": "/srv/fluxion", "release_channel": "nightly"}"#,
        )
        .unwrap();

        let config = load_config(Some(temp_file.path())).unwrap();
        assert_eq!(config.install_path, PathBuf::from("/srv/fluxion"));
        assert_eq!(config.release_channel, ReleaseChannel::Nightly);
        assert_eq!(config.service_name, "fluxion");
        assert_eq!(config.http_timeout_secs, 60);
        assert_eq!(config.stop_grace_secs, 3);
    }

    #[test]
    fn test_load_config_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.binary_name, "fluxion");
    }

    #[test]
    fn test_load_config_invalid_json() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "{ not json").unwrap();

        let result = load_config(Some(temp_file.path()));
        assert!(matches!(result, Err(UpdaterError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = UpdaterConfig {
            service_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UpdaterConfig {
            binary_name: "bin/fluxion".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UpdaterConfig {
            artifact_url_template: "https://example.com/latest.zip".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UpdaterConfig {
            command_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_executable_name_has_platform_suffix() {
        let config = UpdaterConfig::default();
        assert_eq!(
            config.executable_name(),
            format!("fluxion{}", std::env::consts::EXE_SUFFIX)
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let config = UpdaterConfig {
            release_channel: ReleaseChannel::Staging,
            release_token: Some("test-token".to_string()),
            stop_grace_secs: 10,
            retry_delays_secs: vec![],
            ..Default::default()
        };

        let content = serde_json::to_string_pretty(&config).unwrap();
        let loaded: UpdaterConfig = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.release_channel, config.release_channel);
        assert_eq!(loaded.release_token, config.release_token);
        assert_eq!(loaded.stop_grace_secs, 10);
        assert!(loaded.retry_delays_secs.is_empty());
    }
}
