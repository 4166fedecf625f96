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

//! Installation layout and the backup / swap / rollback file operations
//!
//! Layout inside the install directory:
//!
//! - `fluxion` - live binary
//! - `fluxion.bak` - the binary that was live before the last replacement
//! - `fluxion.new` - transient copy used to replace the live binary with a rename

use crate::error::{Result, UpdaterError};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub install_dir: PathBuf,
    pub binary_path: PathBuf,
    pub backup_path: PathBuf,
}

/// What [`Installation::create_backup`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created,
    /// Nothing installed yet, so there is nothing to restore later
    Skipped,
}

impl Installation {
    pub fn new(install_dir: &Path, executable_name: &str) -> Self {
        let binary_path = install_dir.join(executable_name);
        let backup_path = install_dir.join(format!("{executable_name}.bak"));
        Self {
            install_dir: install_dir.to_path_buf(),
            binary_path,
            backup_path,
        }
    }

    fn staged_path(&self) -> PathBuf {
        let mut name = self.binary_path.as_os_str().to_owned();
        name.push(".new");
        PathBuf::from(name)
    }

    pub fn is_installed(&self) -> bool {
        self.binary_path.is_file()
    }

    /// Copy the live binary to the backup path, replacing any older backup.
    pub async fn create_backup(&self) -> Result<BackupOutcome> {
        if !self.is_installed() {
            tracing::info!(
                "No existing binary at {}, skipping backup",
                self.binary_path.display()
            );
            return Ok(BackupOutcome::Skipped);
        }

        if self.backup_path.exists() {
            tracing::debug!("Removing old backup at {}", self.backup_path.display());
            fs::remove_file(&self.backup_path).await.map_err(|e| {
                UpdaterError::Backup(format!(
                    "Failed to remove old backup {}: {e}",
                    self.backup_path.display()
                ))
            })?;
        }

        fs::copy(&self.binary_path, &self.backup_path)
            .await
            .map_err(|e| {
                UpdaterError::Backup(format!(
                    "Failed to copy {} to {}: {e}",
                    self.binary_path.display(),
                    self.backup_path.display()
                ))
            })?;

        tracing::info!("Created backup at {}", self.backup_path.display());
        Ok(BackupOutcome::Created)
    }

    /// Replace the live binary with `new_binary`.
    ///
    /// The new binary is copied next to the live one and renamed over it, so the live
    /// path never holds a partially written file.
    pub async fn replace_binary(&self, new_binary: &Path) -> Result<()> {
        self.install_from(new_binary).await.map_err(|e| {
            UpdaterError::Swap(format!(
                "Failed to install {} as {}: {e}",
                new_binary.display(),
                self.binary_path.display()
            ))
        })
    }

    /// Copy `source` to the staged path and rename it over the live binary.
    /// On failure the staged copy is removed and the live path is untouched.
    async fn install_from(&self, source: &Path) -> std::io::Result<()> {
        let staged = self.staged_path();

        let result = self.stage_and_rename(source, &staged).await;
        if result.is_err() && staged.is_file() {
            let _ = fs::remove_file(&staged).await;
        }
        result
    }

    async fn stage_and_rename(&self, new_binary: &Path, staged: &Path) -> std::io::Result<()> {
        fs::create_dir_all(&self.install_dir).await?;
        fs::copy(new_binary, staged).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(staged).await?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(staged, perms).await?;
        }

        fs::rename(staged, &self.binary_path).await
    }

    /// Undo a failed replacement.
    ///
    /// With a backup, its bytes are staged and renamed over the live path. Without one the
    /// live path is removed so nothing half-installed is left behind.
    pub async fn rollback(&self, backup: BackupOutcome) -> Result<()> {
        match backup {
            BackupOutcome::Created => {
                if !self.backup_path.is_file() {
                    return Err(UpdaterError::Backup(format!(
                        "Backup {} disappeared",
                        self.backup_path.display()
                    )));
                }
                self.install_from(&self.backup_path)
                    .await
                    .map_err(|e| {
                        UpdaterError::Backup(format!(
                            "Failed to restore {}: {e}",
                            self.backup_path.display()
                        ))
                    })?;
                tracing::info!("Restored {} from backup", self.binary_path.display());
            }
            BackupOutcome::Skipped => {
                if self.binary_path.exists() {
                    fs::remove_file(&self.binary_path).await?;
                }
                tracing::info!(
                    "No backup to restore, left {} absent",
                    self.binary_path.display()
                );
            }
        }
        Ok(())
    }
}
