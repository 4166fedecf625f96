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

//! Release archive download and extraction
//!
//! Staging layout under the staging root:
//!
//! - `fluxion-{version}.zip` - downloaded archive
//! - `fluxion-{version}/` - extracted tree, searched for the executable
//!
//! Nothing here touches the install directory.

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdaterError};
use crate::release_checker::ReleaseArtifact;
use crate::version::Version;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

const USER_AGENT: &str = concat!("fluxion-updater/", env!("CARGO_PKG_VERSION"));

/// Fetches a release and hands back the path of the extracted executable
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch_and_extract(&self, artifact: &ReleaseArtifact) -> Result<PathBuf>;

    /// Remove staging files for `artifact`. Best-effort.
    async fn cleanup(&self, artifact: &ReleaseArtifact);
}

#[derive(Debug)]
pub struct HttpDownloader {
    client: reqwest::Client,
    staging_root: PathBuf,
    executable_name: String,
    retry_delays: Vec<Duration>,
}

impl HttpDownloader {
    pub fn new(config: &UpdaterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| UpdaterError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            staging_root: config.staging_root(),
            executable_name: config.executable_name(),
            retry_delays: config
                .retry_delays_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        })
    }

    pub fn archive_path(&self, version: &Version) -> PathBuf {
        self.staging_root.join(format!("fluxion-{version}.zip"))
    }

    pub fn extract_dir(&self, version: &Version) -> PathBuf {
        self.staging_root.join(format!("fluxion-{version}"))
    }

    async fn download_with_retries(&self, url: &str, path: &Path) -> Result<()> {
        let max_attempts = self.retry_delays.len() + 1;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tracing::warn!("Retrying download (attempt {}/{max_attempts})", attempt + 1);
                tokio::time::sleep(self.retry_delays[attempt - 1]).await;
            }

            match self.download(url, path).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Download of {url} failed: {e}");
                    last_error = Some(e);
                    if path.exists() {
                        let _ = tokio::fs::remove_file(path).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| UpdaterError::Download("No error recorded".to_string())))
    }

    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        tracing::info!("Downloading {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdaterError::Network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(UpdaterError::Download(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let write_err = |e: std::io::Error| {
            UpdaterError::Download(format!("Failed to write {}: {e}", path.display()))
        };

        let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| UpdaterError::Download(format!("Failed to download bytes: {e}")))?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        tracing::debug!("Downloaded {written} bytes to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for HttpDownloader {
    async fn fetch_and_extract(&self, artifact: &ReleaseArtifact) -> Result<PathBuf> {
        let archive = self.archive_path(&artifact.version);
        let extract_dir = self.extract_dir(&artifact.version);

        tokio::fs::create_dir_all(&self.staging_root).await?;
        self.download_with_retries(&artifact.download_url, &archive)
            .await?;

        if extract_dir.exists() {
            tracing::debug!("Clearing stale staging dir {}", extract_dir.display());
            tokio::fs::remove_dir_all(&extract_dir).await?;
        }
        tokio::fs::create_dir_all(&extract_dir).await?;

        let executable_name = self.executable_name.clone();
        let executable = tokio::task::spawn_blocking(move || {
            extract_zip(&archive, &extract_dir)?;
            find_executable(&extract_dir, &executable_name).ok_or(
                UpdaterError::ArtifactNotFound {
                    binary: executable_name,
                },
            )
        })
        .await
        .map_err(|e| UpdaterError::Extract(format!("Extraction task failed: {e}")))??;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&executable).await?.permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(&executable, perms).await?;
        }

        tracing::info!("Extracted executable {}", executable.display());
        Ok(executable)
    }

    async fn cleanup(&self, artifact: &ReleaseArtifact) {
        let archive = self.archive_path(&artifact.version);
        if archive.exists()
            && let Err(e) = tokio::fs::remove_file(&archive).await
        {
            tracing::warn!("Failed to remove {}: {e}", archive.display());
        }

        let extract_dir = self.extract_dir(&artifact.version);
        if extract_dir.exists()
            && let Err(e) = tokio::fs::remove_dir_all(&extract_dir).await
        {
            tracing::warn!("Failed to remove {}: {e}", extract_dir.display());
        }
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| UpdaterError::Extract(format!("{}: {e}", archive.display())))?;
    zip.extract(dest)
        .map_err(|e| UpdaterError::Extract(format!("{}: {e}", archive.display())))
}

/// First regular file named `executable_name` anywhere under `root`
fn find_executable(root: &Path, executable_name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .find(|entry| {
            entry.file_type().is_file() && entry.file_name() == OsStr::new(executable_name)
        })
        .map(walkdir::DirEntry::into_path)
}
