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

//! Exclusive per-installation lock
//!
//! Only one update may run against an install directory at a time. The lock is an OS
//! file lock on `{install_dir}/.fluxion-updater.lock`, taken with a single non-blocking
//! attempt and released when the guard is dropped. The file itself stays in place:
//! unlinking it while locked would let a waiting run lock the orphaned inode while a
//! newer run locks a fresh file at the same path.

use crate::error::{Result, UpdaterError};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = ".fluxion-updater.lock";

#[derive(Debug)]
pub struct InstallLock {
    // Lock is held as long as the handle is open
    _file: File,
    path: PathBuf,
}

impl InstallLock {
    pub async fn acquire(install_dir: &Path) -> Result<Self> {
        let install_dir = install_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&install_dir))
            .await
            .map_err(|e| UpdaterError::Io(std::io::Error::other(e)))?
    }

    fn acquire_blocking(install_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(install_dir)?;
        let path = install_dir.join(LOCK_FILE_NAME);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(true) => {
                tracing::debug!("Acquired install lock {}", path.display());
                Ok(Self { _file: file, path })
            }
            Ok(false) => Err(UpdaterError::ConcurrentUpdate(
                install_dir.display().to_string(),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(
                UpdaterError::ConcurrentUpdate(install_dir.display().to_string()),
            ),
            Err(e) => Err(UpdaterError::Io(e)),
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        tracing::debug!("Releasing install lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lock_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(LOCK_FILE_NAME);

        let lock = InstallLock::acquire(dir.path()).await.unwrap();
        assert!(lock_path.exists());

        drop(lock);
        assert!(lock_path.exists());
        assert!(InstallLock::acquire(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiting_handle_and_new_run_exclude_each_other() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(LOCK_FILE_NAME);

        let first = InstallLock::acquire(dir.path()).await.unwrap();
        // Another run that opened the lock file before the first one finished
        let waiting = OpenOptions::new().write(true).open(&lock_path).unwrap();
        drop(first);

        assert!(waiting.try_lock_exclusive().unwrap());
        let third = InstallLock::acquire(dir.path()).await;
        assert!(matches!(third, Err(UpdaterError::ConcurrentUpdate(_))));
    }

    #[tokio::test]
    async fn test_second_lock_fails_fast() {
        let dir = TempDir::new().unwrap();

        let _held = InstallLock::acquire(dir.path()).await.unwrap();
        let second = InstallLock::acquire(dir.path()).await;

        assert!(matches!(second, Err(UpdaterError::ConcurrentUpdate(_))));
    }

    #[tokio::test]
    async fn test_lock_reacquired_after_release() {
        let dir = TempDir::new().unwrap();

        drop(InstallLock::acquire(dir.path()).await.unwrap());
        assert!(InstallLock::acquire(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_creates_install_dir() {
        let dir = TempDir::new().unwrap();
        let install_dir = dir.path().join("opt").join("fluxion");

        let _lock = InstallLock::acquire(&install_dir).await.unwrap();
        assert!(install_dir.is_dir());
    }
}
