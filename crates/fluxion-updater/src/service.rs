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

//! Service lifecycle control for the managed fluxion binary
//!
//! Stop and start never fail the update. Problems are logged at warn level and the
//! orchestrator carries on.

use crate::config::UpdaterConfig;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;
use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    Systemd,
    WindowsScm,
    /// No recognised service wraps the binary
    Unmanaged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub name: String,
    pub manager: ServiceManager,
}

impl ServiceHandle {
    pub fn managed(&self) -> bool {
        self.manager != ServiceManager::Unmanaged
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    ManualStartRequired,
    Failed(String),
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Stop the service and anything else running the binary
    async fn stop(&self);

    /// Start the service. Best-effort.
    async fn start(&self) -> StartOutcome;
}

#[derive(Debug, Clone)]
pub struct SystemServiceController {
    handle: ServiceHandle,
    executable_name: String,
    grace: Duration,
    command_timeout: Duration,
}

impl SystemServiceController {
    pub fn new(
        handle: ServiceHandle,
        executable_name: impl Into<String>,
        grace: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            handle,
            executable_name: executable_name.into(),
            grace,
            command_timeout,
        }
    }

    /// Build a controller, asking the OS service manager whether it knows the service
    pub async fn detect(config: &UpdaterConfig) -> Self {
        let manager = detect_manager(&config.service_name, config.command_timeout()).await;
        match manager {
            ServiceManager::Unmanaged => tracing::warn!(
                "No service named {} found, treating {} as a bare process",
                config.service_name,
                config.binary_name
            ),
            ServiceManager::Systemd | ServiceManager::WindowsScm => {
                tracing::info!("Found {:?} service {}", manager, config.service_name);
            }
        }

        Self::new(
            ServiceHandle {
                name: config.service_name.clone(),
                manager,
            },
            config.executable_name(),
            config.stop_grace(),
            config.command_timeout(),
        )
    }

    pub fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    async fn manager_command(&self, action: &str) -> Result<(), String> {
        let name = self.handle.name.as_str();
        let output = match self.handle.manager {
            ServiceManager::Systemd => {
                run_command("systemctl", &[action, name], self.command_timeout).await?
            }
            ServiceManager::WindowsScm => {
                run_command("sc", &[action, name], self.command_timeout).await?
            }
            ServiceManager::Unmanaged => return Err("service is not managed".to_string()),
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "{action} exited with {}: {}",
                output.status,
                command_message(&output)
            ))
        }
    }
}

#[async_trait]
impl ServiceControl for SystemServiceController {
    async fn stop(&self) {
        if self.handle.managed() {
            tracing::info!("Stopping service {}", self.handle.name);
            if let Err(e) = self.manager_command("stop").await {
                tracing::warn!("Graceful stop of {} failed: {e}", self.handle.name);
            }
            tokio::time::sleep(self.grace).await;
        }

        let executable_name = self.executable_name.clone();
        match tokio::task::spawn_blocking(move || kill_processes(&executable_name)).await {
            Ok(0) => tracing::debug!("No leftover {} processes", self.executable_name),
            Ok(killed) => tracing::warn!(
                "Force-terminated {killed} {} process(es)",
                self.executable_name
            ),
            Err(e) => tracing::warn!("Process scan failed: {e}"),
        }

        tokio::time::sleep(self.grace).await;
    }

    async fn start(&self) -> StartOutcome {
        if !self.handle.managed() {
            tracing::warn!(
                "{} is not a managed service, start it manually if required",
                self.handle.name
            );
            return StartOutcome::ManualStartRequired;
        }

        tracing::info!("Starting service {}", self.handle.name);
        match self.manager_command("start").await {
            Ok(()) => StartOutcome::Started,
            Err(e) => {
                tracing::warn!("Failed to start {}: {e}", self.handle.name);
                StartOutcome::Failed(e)
            }
        }
    }
}

async fn detect_manager(service_name: &str, timeout: Duration) -> ServiceManager {
    if cfg!(windows) {
        return match run_command("sc", &["query", service_name], timeout).await {
            Ok(output) if output.status.success() => ServiceManager::WindowsScm,
            Ok(_) => ServiceManager::Unmanaged,
            Err(e) => {
                tracing::debug!("sc query failed: {e}");
                ServiceManager::Unmanaged
            }
        };
    }

    let unit = format!("{service_name}.service");
    match run_command(
        "systemctl",
        &["list-unit-files", "--no-legend", "--no-pager", &unit],
        timeout,
    )
    .await
    {
        Ok(output) if output.status.success() => {
            if unit_listed(&String::from_utf8_lossy(&output.stdout), &unit) {
                ServiceManager::Systemd
            } else {
                ServiceManager::Unmanaged
            }
        }
        Ok(_) => ServiceManager::Unmanaged,
        Err(e) => {
            tracing::debug!("systemctl unavailable: {e}");
            ServiceManager::Unmanaged
        }
    }
}

/// Whether `systemctl list-unit-files` output contains `unit`
fn unit_listed(stdout: &str, unit: &str) -> bool {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == unit)
}

async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<Output, String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("failed to run {program}: {e}")),
        Err(_) => Err(format!("{program} timed out after {timeout:?}")),
    }
}

fn command_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr.trim().to_string()
    }
}

/// Kill every process running `executable_name`, except ourselves
fn kill_processes(executable_name: &str) -> usize {
    let mut system = System::new();
    system.refresh_processes();
    let own_pid = sysinfo::get_current_pid().ok();

    let mut killed = 0;
    for process in system.processes_by_exact_name(executable_name) {
        if Some(process.pid()) == own_pid {
            continue;
        }
        if terminate(process) {
            killed += 1;
        }
    }
    killed
}

#[cfg(unix)]
fn terminate(process: &sysinfo::Process) -> bool {
    use nix::sys::signal::{self, Signal};

    let Some(pid) = signal_pid(process.pid().as_u32()) else {
        tracing::warn!("PID {} does not fit a signal target, skipping", process.pid());
        return false;
    };
    match signal::kill(pid, Signal::SIGKILL) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to kill PID {pid}: {e}");
            false
        }
    }
}

/// Signal target for a process id; ids beyond `i32::MAX` would alias process groups
#[cfg(unix)]
fn signal_pid(raw: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(raw).ok().map(nix::unistd::Pid::from_raw)
}

#[cfg(not(unix))]
fn terminate(process: &sysinfo::Process) -> bool {
    let killed = process.kill();
    if !killed {
        tracing::warn!("Failed to kill PID {}", process.pid());
    }
    killed
}
