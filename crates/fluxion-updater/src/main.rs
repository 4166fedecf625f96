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

//! FluxION Updater - Entry point for the updater binary
//!
//! Runs one update check against GitHub Releases and, if approved, replaces the
//! installed `fluxion` binary.

use anyhow::Context;
use clap::Parser;
use fluxion_updater::config::load_config;
use fluxion_updater::{
    ReleaseChannel, UpdateFailure, UpdateReport, Updater, UpdaterConfig, UpdaterError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "fluxion-updater", version, about = "Update the installed FluxION binary")]
struct Cli {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the fluxion binary
    #[arg(long)]
    install_path: Option<PathBuf>,

    /// Name of the service wrapping the binary
    #[arg(long)]
    service_name: Option<String>,

    /// Release channel to track
    #[arg(long, value_enum)]
    channel: Option<ReleaseChannel>,

    /// Reinstall even when already up to date, without asking
    #[arg(long)]
    force: bool,

    /// Answer the confirmation prompt with yes
    #[arg(short = 'y', long)]
    yes: bool,

    /// Only report whether an update is available
    #[arg(long)]
    check: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut UpdaterConfig) {
        if let Some(path) = &self.install_path {
            config.install_path.clone_from(path);
        }
        if let Some(name) = &self.service_name {
            config.service_name.clone_from(name);
        }
        if let Some(channel) = self.channel {
            config.release_channel = channel;
        }
        config.force |= self.force;
        config.assume_yes |= self.yes;
        config.check_only |= self.check;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("fluxion_updater={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let line = failure_line(&e);
            error!("{line}");
            println!("{line}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Single-line failure summary; a failed run leads with its target and observed versions
fn failure_line(e: &anyhow::Error) -> String {
    format!("Update failed: {e:#}")
}

fn exit_code(e: &anyhow::Error) -> u8 {
    if let Some(failure) = e.downcast_ref::<UpdateFailure>() {
        return failure.exit_code();
    }
    e.downcast_ref::<UpdaterError>().map_or(1, UpdaterError::exit_code)
}

async fn run(cli: &Cli) -> anyhow::Result<UpdateReport> {
    let mut config = load_config(cli.config.as_deref()).context("Loading configuration")?;
    cli.apply(&mut config);
    info!(
        "Starting FluxION Updater: install_path={}, service={}, channel={:?}",
        config.install_path.display(),
        config.service_name,
        config.release_channel
    );

    let mut updater = Updater::from_config(config).await?;
    Ok(updater.run().await?)
}
