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

//! FluxION Updater - Self-update orchestrator for an installed `fluxion` binary
//!
//! Checks GitHub Releases for a newer build, downloads and unpacks it, stops the
//! service, swaps the binary with a backup in place and starts the service again.
//! A failed swap is rolled back from the backup.

pub mod config;
pub mod confirm;
pub mod downloader;
pub mod error;
pub mod install;
pub mod lock;
pub mod probe;
pub mod release_checker;
pub mod service;
pub mod telemetry;
pub mod upgrader;
pub mod version;

pub use config::{ReleaseChannel, UpdaterConfig};
pub use error::{Result, UpdaterError};
pub use upgrader::{UpdateFailure, UpdateReport, UpdateState, Updater};
pub use version::Version;
