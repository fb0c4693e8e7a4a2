use crate::server::process::{LaunchId, LauncherHandle};

/// Where the supervisor is in its start/stop cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No backend is tracked
    Idle,
    /// A start attempt is in flight
    Starting,
    /// A backend answered on the tracked port
    Running,
}

/// Read-only snapshot of the ledger, published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub port: u16,
    /// True only when this supervisor spawned the backend
    pub owned: bool,
    pub owner_pid: Option<u32>,
    pub launch_id: Option<LaunchId>,
}

impl SupervisorStatus {
    pub fn is_running(&self) -> bool {
        self.state == SupervisorState::Running
    }

    /// `http://127.0.0.1:<port>`
    pub fn backend_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Record of who owns the backend on the target port.
///
/// Mutated only by the orchestration in [`Supervisor`](crate::Supervisor);
/// `owned` is set exclusively by [`OwnershipLedger::mark_spawned`].
#[derive(Debug)]
pub struct OwnershipLedger {
    port: u16,
    state: SupervisorState,
    owned: bool,
    owner_pid: Option<u32>,
    launcher: Option<LauncherHandle>,
}

impl OwnershipLedger {
    pub(crate) fn new(port: u16) -> Self {
        Self {
            port,
            state: SupervisorState::Idle,
            owned: false,
            owner_pid: None,
            launcher: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SupervisorState::Running
    }

    pub fn owned(&self) -> bool {
        self.owned
    }

    pub fn owner_pid(&self) -> Option<u32> {
        self.owner_pid
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            state: self.state,
            port: self.port,
            owned: self.owned,
            owner_pid: self.owner_pid,
            launch_id: self.launcher.as_ref().map(LauncherHandle::id),
        }
    }

    pub(crate) fn mark_starting(&mut self, port: u16) {
        self.reset();
        self.port = port;
        self.state = SupervisorState::Starting;
    }

    /// A backend was already answering; we did not start it.
    pub(crate) fn mark_reused(&mut self, owner_pid: Option<u32>) {
        self.state = SupervisorState::Running;
        self.owned = false;
        self.owner_pid = owner_pid;
        self.launcher = None;
    }

    /// Our own spawn became ready.
    pub(crate) fn mark_spawned(&mut self, launcher: LauncherHandle, owner_pid: Option<u32>) {
        self.state = SupervisorState::Running;
        self.owned = true;
        self.owner_pid = owner_pid;
        self.launcher = Some(launcher);
    }

    /// Fill in an owner pid resolved after the fact.
    pub(crate) fn set_owner_pid(&mut self, owner_pid: u32) {
        self.owner_pid = Some(owner_pid);
    }

    /// Reap the launcher if it has exited. True while it is still running.
    pub(crate) fn poll_launcher(&mut self) -> bool {
        self.launcher
            .as_mut()
            .is_some_and(|launcher| launcher.try_exited().is_none())
    }

    pub(crate) fn take_launcher(&mut self) -> Option<LauncherHandle> {
        self.launcher.take()
    }

    /// Back to idle, keeping the last target port.
    pub(crate) fn reset(&mut self) {
        self.state = SupervisorState::Idle;
        self.owned = false;
        self.owner_pid = None;
        self.launcher = None;
    }
}
