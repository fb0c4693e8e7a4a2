/// Error handling module for the backend supervisor.
///
/// This module defines the error types used throughout the library. Only
/// [`Error::Spawn`] and [`Error::Timeout`] ever reach callers of
/// [`Supervisor::start`](crate::Supervisor::start); owner resolution and
/// shutdown failures are logged and absorbed by the orchestration.
///
/// # Example
///
/// ```
/// use backend_supervisor::error::{Error, Result, SpawnError};
///
/// fn describe(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Backend is live"),
///         Err(Error::Spawn(SpawnError::CommandNotFound { command })) => {
///             println!("'{}' is not installed", command)
///         }
///         Err(Error::Timeout { port, .. }) => println!("Port {} may be occupied", port),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Reasons a launcher could not produce a child process.
///
/// These are never retried automatically; the caller decides whether to
/// surface them or try again.
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The interpreter or shell could not be found on this machine.
    #[error("command '{command}' was not found")]
    CommandNotFound { command: String },

    /// The directory the backend must run from does not exist.
    #[error("working directory '{}' does not exist", path.display())]
    WorkingDirMissing { path: PathBuf },

    /// The packaged entry artifact is absent.
    #[error("entry artifact '{}' does not exist", path.display())]
    EntryMissing { path: PathBuf },

    /// The operating system rejected the spawn call.
    #[error("failed to spawn '{command}': {source}")]
    Os {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Classify an `io::Error` returned by a spawn attempt.
    pub(crate) fn from_io(command: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            SpawnError::CommandNotFound {
                command: command.to_string(),
            }
        } else {
            SpawnError::Os {
                command: command.to_string(),
                source,
            }
        }
    }
}

/// Errors that can occur in the backend-supervisor library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The file cannot be read
    /// - The JSON or YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The backend process could not be launched.
    #[error("Failed to launch backend: {0}")]
    Spawn(#[from] SpawnError),

    /// The backend was launched but never answered on its port.
    ///
    /// The process may still be alive; it is not considered running.
    #[error("Backend on port {port} did not become ready within {waited:?}")]
    Timeout { port: u16, waited: Duration },

    /// The process bound to the backend port could not be identified.
    #[error("Could not resolve owner of port: {0}")]
    OwnerResolution(String),

    /// A termination signal failed or the target survived escalation.
    #[error("Shutdown failed: {0}")]
    Shutdown(String),

    /// Error while running an auxiliary OS command.
    #[error("Process error: {0}")]
    Process(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// A short, user-facing hint for failures that block the backend.
    ///
    /// Returns `None` for errors that are not meant to be surfaced.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Spawn(SpawnError::CommandNotFound { .. }) => {
                Some("Install the required runtime and make sure it is on PATH.")
            }
            Error::Spawn(SpawnError::WorkingDirMissing { .. })
            | Error::Spawn(SpawnError::EntryMissing { .. }) => {
                Some("The backend files are missing; reinstall the application.")
            }
            Error::Spawn(SpawnError::Os { .. }) => {
                Some("The operating system refused to start the backend.")
            }
            Error::Timeout { .. } => {
                Some("The backend port may be occupied by another program.")
            }
            _ => None,
        }
    }
}

/// Result type for backend-supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;
