// src/server/process.rs
use crate::error::{Error, Result};
use async_process::{Child, Command, ExitStatus};
use std::ffi::OsStr;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[cfg(windows)]
pub(crate) const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
pub(crate) const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Timeout for auxiliary OS queries (`lsof`, `taskkill`, ...)
pub(crate) const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Unique identifier for one launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchId(Uuid);

impl LaunchId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The immediate child created by a spawn call.
///
/// In development mode this is usually a shell, not the process that ends up
/// bound to the backend port. It is only a secondary shutdown target.
#[derive(Debug)]
pub struct LauncherHandle {
    id: LaunchId,
    program: String,
    child: Child,
}

impl LauncherHandle {
    /// Wrap a freshly spawned child
    pub fn new(child: Child, program: impl Into<String>) -> Self {
        Self {
            id: LaunchId::new(),
            program: program.into(),
            child,
        }
    }

    pub fn id(&self) -> LaunchId {
        self.id
    }

    /// OS process id of the launcher
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Reap the launcher if it has exited, without blocking
    pub fn try_exited(&mut self) -> Option<ExitStatus> {
        self.child.try_status().ok().flatten()
    }

    /// Forcefully kill the launcher.
    ///
    /// Fails if the process has already exited, which callers usually ignore.
    pub fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| Error::Process(format!("Failed to kill launcher {}: {}", self.pid(), e)))
    }

    /// Wait up to `timeout` for the launcher to exit
    pub async fn reap(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.status()).await {
            Ok(Ok(status)) => Some(status),
            _ => None,
        }
    }
}

/// A command for a short-lived helper (`lsof`, `netstat`, `--version` checks)
/// that never flashes a console window.
pub(crate) fn quiet_command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    command.stdin(async_process::Stdio::null());

    #[cfg(windows)]
    {
        use async_process::windows::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    command
}

/// Run a helper command and return its stdout, bounded by [`QUERY_TIMEOUT`].
pub(crate) async fn run_query(mut command: Command, label: &str) -> Result<String> {
    let output = tokio::time::timeout(QUERY_TIMEOUT, command.output())
        .await
        .map_err(|_| Error::Process(format!("'{}' timed out", label)))?
        .map_err(|e| Error::Process(format!("Failed to run '{}': {}", label, e)))?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether `pid` is present in the OS process table.
///
/// A zombie still counts as present; reap direct children first.
#[cfg(unix)]
pub(crate) async fn process_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        // Exists but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(windows)]
pub(crate) async fn process_exists(pid: u32) -> bool {
    let filter = format!("PID eq {}", pid);
    let mut command = quiet_command("tasklist");
    command.args(["/FI", filter.as_str(), "/NH", "/FO", "CSV"]);

    match run_query(command, "tasklist").await {
        Ok(stdout) => stdout.contains(&format!("\"{}\"", pid)),
        Err(e) => {
            tracing::debug!(pid, error = %e, "tasklist failed, assuming process is gone");
            false
        }
    }
}

/// Send a termination request to `pid`; `force` skips the graceful path.
///
/// A process that no longer exists is treated as success.
#[cfg(unix)]
pub(crate) async fn signal_process(pid: u32, force: bool) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::Shutdown(format!("Failed to send {:?} to {}: {}", signal, pid, e))),
    }
}

#[cfg(windows)]
pub(crate) async fn signal_process(pid: u32, force: bool) -> Result<()> {
    let pid_arg = pid.to_string();
    let mut command = quiet_command("taskkill");
    command.args(["/PID", pid_arg.as_str(), "/T"]);
    if force {
        command.arg("/F");
    }

    let output = tokio::time::timeout(QUERY_TIMEOUT, command.output())
        .await
        .map_err(|_| Error::Shutdown(format!("taskkill for {} timed out", pid)))?
        .map_err(|e| Error::Shutdown(format!("Failed to run taskkill for {}: {}", pid, e)))?;

    // 128: no such process
    if output.status.success() || output.status.code() == Some(128) {
        Ok(())
    } else {
        Err(Error::Shutdown(format!(
            "taskkill for {} exited with {}: {}",
            pid,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
