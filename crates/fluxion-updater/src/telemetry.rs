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

//! Structured update events

use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum UpdateEvent {
    UpdateStarted {
        from_version: Option<Version>,
        to_version: Version,
    },
    UpdateCompleted {
        from_version: Option<Version>,
        to_version: Version,
        duration_secs: u64,
    },
    UpdateFailed {
        from_version: Option<Version>,
        to_version: Version,
        error: String,
    },
    RollbackStarted {
        from_version: Version,
        to_version: Option<Version>,
    },
    RollbackCompleted {
        restored_version: Option<Version>,
    },
    RollbackFailed {
        error: String,
    },
}

#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a UpdateEvent,
}

/// Emit an update event as a JSON log line.
///
/// Fire-and-forget: serialisation problems are logged and never reach the update flow.
pub fn report_event(event: &UpdateEvent) {
    let record = EventRecord {
        at: Utc::now(),
        event,
    };
    match serde_json::to_string(&record) {
        Ok(json) => tracing::info!(target: "fluxion_updater::events", "Update event: {json}"),
        Err(e) => tracing::warn!("Failed to serialize update event: {e}"),
    }
}
