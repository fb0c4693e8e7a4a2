//! Helpers for turning a failed start into a specific message.
//!
//! These sit outside the supervisor's own contract: the application calls
//! them after [`Supervisor::start`](crate::Supervisor::start) fails to tell
//! "runtime not installed" apart from "port occupied".

use crate::config::LaunchConfig;
use crate::error::{Error, SpawnError};
use crate::server::process::{quiet_command, run_query};

/// Likely cause of a failed start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDiagnosis {
    /// The runtime command does not run at all
    RuntimeMissing { command: String },
    /// The runtime is installed, so the backend itself did not come up
    BackendUnresponsive { runtime_version: String, port: u16 },
    /// Backend files are missing from the installation
    FilesMissing { detail: String },
    /// Anything else
    Other { detail: String },
}

impl StartDiagnosis {
    /// One sentence suitable for a dialog
    pub fn message(&self) -> String {
        match self {
            StartDiagnosis::RuntimeMissing { command } => {
                format!("'{}' is not installed or not on PATH.", command)
            }
            StartDiagnosis::BackendUnresponsive {
                runtime_version,
                port,
            } => format!(
                "The backend did not respond on port {} (runtime {}). The port may be in use by another program.",
                port, runtime_version
            ),
            StartDiagnosis::FilesMissing { detail } => {
                format!("Backend files are missing: {}", detail)
            }
            StartDiagnosis::Other { detail } => detail.clone(),
        }
    }
}

/// First line of `<command> --version`, or `None` if it does not run.
#[tracing::instrument]
pub async fn runtime_version(command: &str) -> Option<String> {
    let mut version = quiet_command(command);
    version.arg("--version");

    match run_query(version, command).await {
        Ok(stdout) => {
            let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
            Some(line.to_string())
        }
        Err(e) => {
            tracing::debug!(error = %e, "Runtime version check failed");
            None
        }
    }
}

/// Program whose presence decides between "not installed" and "port busy".
///
/// For development launches this is the first word of the run command.
pub fn runtime_command(launch: &LaunchConfig) -> &str {
    match launch {
        LaunchConfig::Packaged { .. } => launch.program(),
        LaunchConfig::Development { run_command, .. } => {
            run_command.split_whitespace().next().unwrap_or(run_command)
        }
    }
}

/// Classify a start failure, running a version check when it helps.
pub async fn diagnose_start_failure(error: &Error, launch: &LaunchConfig) -> StartDiagnosis {
    match error {
        Error::Spawn(SpawnError::CommandNotFound { command }) => StartDiagnosis::RuntimeMissing {
            command: command.clone(),
        },
        Error::Spawn(e @ SpawnError::EntryMissing { .. })
        | Error::Spawn(e @ SpawnError::WorkingDirMissing { .. }) => StartDiagnosis::FilesMissing {
            detail: e.to_string(),
        },
        Error::Timeout { port, .. } => {
            let command = runtime_command(launch);
            match runtime_version(command).await {
                Some(runtime_version) => StartDiagnosis::BackendUnresponsive {
                    runtime_version,
                    port: *port,
                },
                None => StartDiagnosis::RuntimeMissing {
                    command: command.to_string(),
                },
            }
        }
        other => StartDiagnosis::Other {
            detail: other.to_string(),
        },
    }
}
