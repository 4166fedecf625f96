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

//! GitHub API release checking module

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdaterError};
use crate::version::Version;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(target_arch = "x86_64")]
const ARCH: &str = "amd64";
#[cfg(target_arch = "aarch64")]
const ARCH: &str = "aarch64";
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const ARCH: &str = std::env::consts::ARCH;

const USER_AGENT: &str = concat!("fluxion-updater/", env!("CARGO_PKG_VERSION"));
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// A downloadable release archive for one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArtifact {
    pub version: Version,
    pub download_url: String,
}

/// Source of published releases
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Latest published version
    async fn latest_version(&self) -> Result<Version>;

    /// Artifact to download for `version`
    fn artifact_for(&self, version: &Version) -> ReleaseArtifact;
}

#[derive(Debug, Deserialize, Serialize)]
struct GithubRelease {
    tag_name: String,
}

/// Platform identifier used in artifact names, e.g. `linux-amd64`
pub fn platform_target() -> String {
    format!("{}-{ARCH}", std::env::consts::OS)
}

/// Expand an artifact URL template for `version`
pub fn artifact_url(template: &str, repo: &str, version: &Version) -> String {
    let version = version.to_string();
    template
        .replace("{tag}", &format!("v{version}"))
        .replace("{version}", &version)
        .replace("{repo}", repo)
        .replace("{target}", &platform_target())
}

#[derive(Debug)]
pub struct GithubReleaseSource {
    client: reqwest::Client,
    latest_url: String,
    repo: String,
    token: Option<String>,
    artifact_url_template: String,
}

impl GithubReleaseSource {
    pub fn new(config: &UpdaterConfig) -> Result<Self> {
        let repo = config.release_channel.github_repo().to_string();

        let token = if config.release_channel.is_private() {
            let token = config.release_token.clone().ok_or_else(|| {
                UpdaterError::Config(format!("release_token required for private repo {repo}"))
            })?;
            Some(token)
        } else {
            config.release_token.clone()
        };

        let base_url = config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| UpdaterError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            latest_url: format!("{base_url}/repos/{repo}/releases/latest"),
            repo,
            token,
            artifact_url_template: config.artifact_url_template.clone(),
        })
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn latest_version(&self) -> Result<Version> {
        tracing::debug!("Querying {}", self.latest_url);

        let mut request = self.client.get(&self.latest_url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpdaterError::Network(format!("Release check request failed: {e}")))?;

        if let Some(remaining) = response.headers().get("x-ratelimit-remaining")
            && let Ok(remaining_str) = remaining.to_str()
            && let Ok(remaining_int) = remaining_str.parse::<u32>()
            && remaining_int < 10
        {
            tracing::warn!("GitHub rate limit low: {remaining_int} remaining");
        }

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(UpdaterError::Network(format!(
                "GitHub API error {status}: {}",
                body.trim()
            )));
        }

        let release: GithubRelease = response
            .json()
            .await
            .map_err(|e| UpdaterError::Metadata(format!("Failed to parse release: {e}")))?;

        let version = Version::from_tag(&release.tag_name)?;
        tracing::debug!("Latest release tag {} -> {version}", release.tag_name);
        Ok(version)
    }

    fn artifact_for(&self, version: &Version) -> ReleaseArtifact {
        ReleaseArtifact {
            version: *version,
            download_url: artifact_url(&self.artifact_url_template, &self.repo, version),
        }
    }
}
