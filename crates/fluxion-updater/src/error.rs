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

//! Error types for the updater crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("release metadata error: {0}")]
    Metadata(String),

    #[error("version parse error: {0}")]
    VersionParse(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("extract failed: {0}")]
    Extract(String),

    #[error("executable {binary} not found in release archive")]
    ArtifactNotFound { binary: String },

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("binary replace failed (previous binary restored): {0}")]
    Swap(String),

    #[error("rollback failed after swap error ({swap}): {rollback}; install may be inconsistent")]
    RollbackFailed { swap: String, rollback: String },

    #[error("another update is already running for {0}")]
    ConcurrentUpdate(String),
}

impl UpdaterError {
    /// Process exit status for this error. A failed rollback gets its own code
    /// so operators can tell a broken installation from an ordinary failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RollbackFailed { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
