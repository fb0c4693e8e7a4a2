use crate::server::launcher::ProcessControl;
use crate::server::process::LauncherHandle;
use std::time::Duration;
use tokio::time::{self, Instant};

const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LAUNCHER_REAP_TIMEOUT: Duration = Duration::from_millis(500);

/// What [`Supervisor::stop`](crate::Supervisor::stop) did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running
    NotRunning,
    /// The backend was not ours; tracking ended without sending any signal
    Detached { owner_pid: Option<u32> },
    /// Our backend's pid could not be determined, so it was left running
    OwnerUnknown,
    /// The owner exited; `forced` if escalation was needed
    Terminated { pid: u32, forced: bool },
    /// The owner survived escalation
    LeftRunning { pid: u32 },
}

impl StopOutcome {
    /// Whether a backend process may still be alive after the stop
    pub fn may_be_running(&self) -> bool {
        matches!(
            self,
            StopOutcome::Detached { .. } | StopOutcome::OwnerUnknown | StopOutcome::LeftRunning { .. }
        )
    }
}

/// Graceful-then-forceful termination of an owned backend
pub struct ShutdownSequencer<'a> {
    control: &'a dyn ProcessControl,
    grace_period: Duration,
    kill_timeout: Duration,
}

impl<'a> ShutdownSequencer<'a> {
    pub fn new(control: &'a dyn ProcessControl, grace_period: Duration, kill_timeout: Duration) -> Self {
        Self {
            control,
            grace_period,
            kill_timeout,
        }
    }

    /// Terminate `pid`, then clean up the launcher.
    ///
    /// Failures are logged, never returned.
    #[tracing::instrument(skip(self, launcher), fields(launcher_pid = launcher.as_ref().map(|l| l.pid())))]
    pub async fn terminate(&self, pid: u32, mut launcher: Option<&mut LauncherHandle>) -> StopOutcome {
        if let Err(e) = self.control.terminate(pid, false).await {
            tracing::warn!(error = %e, "Graceful termination failed, escalating");
        }

        time::sleep(self.grace_period).await;

        let outcome = if !self.still_alive(pid, launcher.as_deref_mut()).await {
            tracing::info!("Backend exited after graceful signal");
            StopOutcome::Terminated { pid, forced: false }
        } else {
            tracing::info!("Backend still alive after grace period, killing");
            if let Err(e) = self.control.terminate(pid, true).await {
                tracing::warn!(error = %e, "Forceful termination failed");
            }

            if self.wait_for_exit(pid, launcher.as_deref_mut()).await {
                StopOutcome::Terminated { pid, forced: true }
            } else {
                tracing::warn!("Backend survived forceful termination");
                StopOutcome::LeftRunning { pid }
            }
        };

        if let Some(handle) = launcher {
            self.cleanup_launcher(pid, handle).await;
        }

        outcome
    }

    async fn wait_for_exit(&self, pid: u32, mut launcher: Option<&mut LauncherHandle>) -> bool {
        let deadline = Instant::now() + self.kill_timeout;
        loop {
            if !self.still_alive(pid, launcher.as_deref_mut()).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            time::sleep(KILL_POLL_INTERVAL).await;
        }
    }

    /// Process-table check; a direct child is reaped first so it does not
    /// linger as a zombie.
    async fn still_alive(&self, pid: u32, launcher: Option<&mut LauncherHandle>) -> bool {
        if let Some(handle) = launcher {
            if handle.pid() == pid && handle.try_exited().is_some() {
                return false;
            }
        }
        self.control.is_alive(pid).await
    }

    async fn cleanup_launcher(&self, owner_pid: u32, handle: &mut LauncherHandle) {
        if handle.try_exited().is_some() {
            return;
        }

        if handle.pid() != owner_pid {
            if let Err(e) = handle.kill() {
                tracing::debug!(error = %e, "Launcher already gone");
            }
        }

        if handle.reap(LAUNCHER_REAP_TIMEOUT).await.is_none() {
            tracing::debug!(launcher_pid = handle.pid(), "Launcher not reaped");
        }
    }
}
