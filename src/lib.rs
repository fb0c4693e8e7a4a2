/*!
 # Backend Supervisor

 A Rust library for desktop applications that depend on a local companion
 backend server.

 ## Overview

 Backend Supervisor provides functionality to:
 - Detect a backend that is already serving on the target port and reuse it
 - Launch the backend detached, from a packaged runtime or a development tree
 - Wait for the backend to become ready within a deadline
 - Find the process that actually owns the listening port
 - Shut down only a backend this instance started, gracefully first

 ## Basic Usage

 ```no_run
 use backend_supervisor::{Supervisor, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Create a supervisor from a config file
     let supervisor = Supervisor::from_config_file("supervisor.json")?;

     // Make sure a backend is live on the configured port
     let outcome = supervisor.start(None).await?;
     println!("{:?}, API at {}", outcome, supervisor.backend_url());

     // On application exit
     let stopped = supervisor.shutdown().await;
     println!("{:?}", stopped);

     Ok(())
 }
 ```

 ## Features

 - **Ownership tracking**: never signals a backend it did not spawn
 - **Reuse detection**: any HTTP answer on the liveness path, even 401, counts as live
 - **Detached launch**: the backend survives the UI process
 - **Status channel**: observe state changes through a `watch` receiver
 - **Liveness monitor**: optional background probe that notices a dead backend
*/

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod server;

pub use config::{LaunchConfig, SupervisorConfig};
pub use error::{Error, Result, SpawnError};
pub use server::{StopOutcome, SupervisorState, SupervisorStatus};

use server::launcher::{self, ProcessControl};
use server::lifecycle::{LifecycleEvent, LifecycleLog};
use server::monitor::{BackendHealth, HealthTracker, MonitorConfig};
use server::process::LaunchId;
use server::readiness::{self, Readiness};
use server::{HealthProber, OwnershipLedger, ShutdownSequencer};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Result of a successful [`Supervisor::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// We launched the backend and it became ready
    Spawned {
        owner_pid: Option<u32>,
        elapsed: Duration,
    },
    /// Another process was already serving; we do not own it
    Reused { owner_pid: Option<u32> },
    /// This supervisor was already tracking a live backend
    AlreadyRunning,
}

struct Shared {
    config: SupervisorConfig,
    prober: HealthProber,
    control: Arc<dyn ProcessControl>,
    ledger: Mutex<OwnershipLedger>,
    status: watch::Sender<SupervisorStatus>,
    lifecycle: LifecycleLog,
    pending_start: StdMutex<Option<JoinHandle<Result<StartOutcome>>>>,
    monitor_task: StdMutex<Option<JoinHandle<()>>>,
}

/// Launches, tracks and stops the local backend.
///
/// Create one per application in the composition root and pass clones
/// around; clones share the same ledger. `start` and `stop` calls on one
/// supervisor are serialized, so concurrent starts never spawn twice.
/// Separate supervisors (e.g. two UI processes) coordinate only through
/// reuse detection.
/// All public async methods are instrumented with `tracing` spans.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Create a supervisor from a configuration file path.
    ///
    /// `BACKEND_SUPERVISOR_PORT` overrides the configured port.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading supervisor configuration from file");
        let config = SupervisorConfig::from_file(path)?.with_env_overrides()?;
        Self::new(config)
    }

    /// Create a supervisor using the launch strategy named in `config`
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let control = launcher::for_config(&config);
        Self::with_control(config, control)
    }

    /// Create a supervisor with an explicit [`ProcessControl`] strategy
    #[tracing::instrument(skip(config, control), fields(port = config.port, strategy = control.describe()))]
    pub fn with_control(config: SupervisorConfig, control: Arc<dyn ProcessControl>) -> Result<Self> {
        config::validate_config(&config)?;
        let prober = HealthProber::from_config(&config)?;
        let ledger = OwnershipLedger::new(config.port);
        let (status, _) = watch::channel(ledger.status());

        tracing::debug!("Created supervisor");
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                prober,
                control,
                ledger: Mutex::new(ledger),
                status,
                lifecycle: LifecycleLog::new(),
                pending_start: StdMutex::new(None),
                monitor_task: StdMutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Latest published status; never waits on an in-flight start
    pub fn status(&self) -> SupervisorStatus {
        *self.shared.status.borrow()
    }

    /// Receive every status change
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn current_port(&self) -> u16 {
        self.status().port
    }

    /// Base URL for the API client
    pub fn backend_url(&self) -> String {
        self.status().backend_url()
    }

    /// Lifecycle history, newest events first
    pub fn lifecycle(&self) -> &LifecycleLog {
        &self.shared.lifecycle
    }

    /// Ensure a backend is live on `port` (or the configured port).
    ///
    /// Reuses a backend that already answers without claiming ownership,
    /// otherwise launches one and waits for it. Returns
    /// [`Error::Spawn`] or [`Error::Timeout`] when no backend is live.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, port: Option<u16>) -> Result<StartOutcome> {
        let port = port.unwrap_or(self.shared.config.port);
        let mut ledger = self.shared.ledger.lock().await;

        if ledger.is_running() {
            if ledger.port() != port {
                tracing::warn!(running_port = ledger.port(), "Backend already running on another port");
            } else {
                tracing::debug!("Backend already running");
            }
            return Ok(StartOutcome::AlreadyRunning);
        }

        ledger.mark_starting(port);
        self.publish(&ledger);

        if self.shared.prober.probe(port).await.is_alive() {
            tracing::info!("Found a live backend, reusing it without ownership");
            let owner_pid = self.shared.control.resolve_owner(port).await;
            ledger.mark_reused(owner_pid);
            self.publish(&ledger);
            self.record(
                None,
                port,
                LifecycleEvent::Reused,
                owner_pid.map(|pid| format!("owner pid {}", pid)),
            );
            return Ok(StartOutcome::Reused { owner_pid });
        }

        tracing::info!(strategy = self.shared.control.describe(), "No backend found, launching one");
        let launcher = match self.shared.control.spawn(port).await {
            Ok(launcher) => launcher,
            Err(e) => {
                tracing::error!(error = %e, "Failed to launch backend");
                ledger.reset();
                self.publish(&ledger);
                self.record(None, port, LifecycleEvent::StartFailed, Some(e.to_string()));
                return Err(Error::Spawn(e));
            }
        };
        let launch_id = launcher.id();
        self.record(
            Some(launch_id),
            port,
            LifecycleEvent::Spawned,
            Some(format!("launcher pid {}", launcher.pid())),
        );

        let config = &self.shared.config;
        match readiness::await_ready(
            &self.shared.prober,
            port,
            config.poll_interval(),
            config.startup_deadline(),
        )
        .await
        {
            Readiness::Ready { elapsed } => {
                let owner_pid = self.shared.control.resolve_owner(port).await;
                if owner_pid.is_none() {
                    tracing::warn!("Backend is ready but its owner pid is unknown");
                }
                ledger.mark_spawned(launcher, owner_pid);
                self.publish(&ledger);
                self.record(
                    Some(launch_id),
                    port,
                    LifecycleEvent::Ready,
                    Some(format!("ready after {}ms", elapsed.as_millis())),
                );
                Ok(StartOutcome::Spawned { owner_pid, elapsed })
            }
            Readiness::TimedOut { waited } => {
                // The launcher is released, not killed; it may still come up later.
                ledger.reset();
                self.publish(&ledger);
                self.record(
                    Some(launch_id),
                    port,
                    LifecycleEvent::StartFailed,
                    Some(format!("not ready after {}ms", waited.as_millis())),
                );
                Err(Error::Timeout { port, waited })
            }
        }
    }

    /// Run [`start`](Self::start) as a background task owned by the supervisor.
    ///
    /// Returns `false` if a previous background start is still in flight.
    /// Observe progress through [`status`](Self::status) or
    /// [`subscribe`](Self::subscribe), or await it with
    /// [`join_start`](Self::join_start).
    pub fn start_in_background(&self, port: Option<u16>) -> bool {
        let mut pending = lock_ignoring_poison(&self.shared.pending_start);
        if pending.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("Background start already in flight");
            return false;
        }

        let supervisor = self.clone();
        *pending = Some(tokio::spawn(async move { supervisor.start(port).await }));
        true
    }

    /// Wait for the background start, if there is one
    pub async fn join_start(&self) -> Option<Result<StartOutcome>> {
        let task = lock_ignoring_poison(&self.shared.pending_start).take()?;
        match task.await {
            Ok(result) => Some(result),
            Err(e) => Some(Err(Error::Other(format!("Background start task failed: {}", e)))),
        }
    }

    /// Stop the backend if this supervisor owns it.
    ///
    /// Only a resolved owner pid is ever signalled. A reused backend is left
    /// alone and merely forgotten. The ledger is reset in every case, so the
    /// supervisor never stays stuck on a backend that refuses to die.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> StopOutcome {
        if let Some(Err(e)) = self.join_start().await {
            tracing::debug!(error = %e, "Background start had failed before stop");
        }

        let mut ledger = self.shared.ledger.lock().await;
        if !ledger.is_running() {
            tracing::debug!("No backend running");
            return StopOutcome::NotRunning;
        }

        let port = ledger.port();
        let launch_id = ledger.status().launch_id;

        if !ledger.owned() {
            let owner_pid = ledger.owner_pid();
            tracing::info!(port, ?owner_pid, "Backend was not started by us, leaving it running");
            ledger.reset();
            self.publish(&ledger);
            self.record(None, port, LifecycleEvent::Detached, Some("not owned".to_string()));
            return StopOutcome::Detached { owner_pid };
        }

        let owner_pid = match ledger.owner_pid() {
            Some(pid) => Some(pid),
            None => {
                tracing::debug!(port, "Owner pid unknown, resolving again");
                self.shared.control.resolve_owner(port).await
            }
        };

        let Some(pid) = owner_pid else {
            tracing::warn!(port, "Could not resolve backend pid, leaving it running");
            ledger.reset();
            self.publish(&ledger);
            self.record(
                launch_id,
                port,
                LifecycleEvent::Detached,
                Some("owner pid unknown".to_string()),
            );
            return StopOutcome::OwnerUnknown;
        };

        let mut launcher = ledger.take_launcher();
        let config = &self.shared.config;
        let sequencer = ShutdownSequencer::new(
            self.shared.control.as_ref(),
            config.grace_period(),
            config.kill_timeout(),
        );
        let outcome = sequencer.terminate(pid, launcher.as_mut()).await;

        ledger.reset();
        self.publish(&ledger);
        self.record(launch_id, port, LifecycleEvent::Stopped, Some(format!("{:?}", outcome)));
        tracing::info!(?outcome, "Backend stop finished");
        outcome
    }

    /// Probe the running backend periodically and forget it once it stops answering.
    ///
    /// A backend we spawned is only forgotten once its process is gone too;
    /// a hung one stays tracked so [`stop`](Self::stop) can still terminate it.
    /// Replaces any monitor started earlier. The task does not keep the
    /// supervisor alive.
    pub fn spawn_monitor(&self, config: MonitorConfig) {
        let shared = Arc::downgrade(&self.shared);
        let task = tokio::spawn(async move {
            let mut tracker = HealthTracker::new(&config);
            let mut interval = time::interval(config.check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                Supervisor { shared }.check_liveness(&mut tracker).await;
            }
        });

        if let Some(previous) = lock_ignoring_poison(&self.shared.monitor_task).replace(task) {
            previous.abort();
        }
    }

    pub fn stop_monitor(&self) {
        if let Some(task) = lock_ignoring_poison(&self.shared.monitor_task).take() {
            task.abort();
        }
    }

    /// Application-exit path: stop monitoring, finish any start, then stop.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> StopOutcome {
        self.stop_monitor();
        self.stop().await
    }

    async fn check_liveness(&self, tracker: &mut HealthTracker) {
        let status = self.status();
        if !status.is_running() {
            tracker.reset();
            return;
        }

        match tracker.observe(self.shared.prober.probe(status.port).await) {
            BackendHealth::Healthy => {}
            BackendHealth::Degraded => {
                tracing::debug!(port = status.port, "Backend missed a liveness probe");
            }
            BackendHealth::Lost => {
                tracker.reset();
                let mut ledger = self.shared.ledger.lock().await;
                // A stop or restart may have happened while we were probing
                if ledger.status() != status {
                    return;
                }
                if ledger.owned() && self.owned_process_alive(&mut ledger).await {
                    tracing::warn!(
                        port = status.port,
                        owner_pid = ?ledger.owner_pid(),
                        "Backend stopped answering but its process is alive, keeping it tracked"
                    );
                    self.publish(&ledger);
                    self.record(status.launch_id, status.port, LifecycleEvent::Unresponsive, None);
                    return;
                }
                tracing::warn!(port = status.port, "Backend stopped answering, marking it lost");
                ledger.reset();
                self.publish(&ledger);
                self.record(status.launch_id, status.port, LifecycleEvent::Lost, None);
            }
        }
    }

    /// Process-table check for an owned backend that failed its probes.
    ///
    /// A pid resolved here is kept so a later stop can still target it.
    async fn owned_process_alive(&self, ledger: &mut OwnershipLedger) -> bool {
        // Reap first: an exited direct child still shows up as a zombie
        ledger.poll_launcher();

        let owner_pid = match ledger.owner_pid() {
            Some(pid) => Some(pid),
            None => self.shared.control.resolve_owner(ledger.port()).await,
        };
        let Some(pid) = owner_pid else {
            return false;
        };

        if !self.shared.control.is_alive(pid).await {
            return false;
        }
        ledger.set_owner_pid(pid);
        true
    }

    fn publish(&self, ledger: &OwnershipLedger) {
        self.shared.status.send_replace(ledger.status());
    }

    fn record(&self, launch_id: Option<LaunchId>, port: u16, event: LifecycleEvent, details: Option<String>) {
        if let Err(e) = self.shared.lifecycle.record(launch_id, port, event, details) {
            tracing::warn!(error = %e, ?event, "Failed to record lifecycle event");
        }
    }
}

fn lock_ignoring_poison<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
