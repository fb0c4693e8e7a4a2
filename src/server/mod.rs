/// Backend process management for the supervisor.
///
/// This module contains the building blocks the [`Supervisor`](crate::Supervisor)
/// composes: probing a port, launching the backend, waiting for readiness,
/// finding the pid that owns the port, and shutting it down again.
/// All public async operations are instrumented with `tracing` spans.
///
/// # Components
///
/// * `health` - Single-shot liveness probe against `127.0.0.1:<port>`
/// * `launcher` - Packaged-runtime and development-shell launch strategies
/// * `readiness` - Bounded polling until the backend answers
/// * `owner` - Port to pid resolution through OS tooling
/// * `ledger` - Who owns the running backend
/// * `shutdown` - Graceful-then-forceful termination of an owned backend
/// * `lifecycle` - Bounded event history
/// * `monitor` - Consecutive-failure tracking for the liveness monitor
///
/// # Examples
///
/// Probing a port:
///
/// ```no_run
/// use backend_supervisor::server::{HealthProber, Probe};
/// use std::time::Duration;
///
/// # async fn run() -> backend_supervisor::Result<()> {
/// let prober = HealthProber::new("/api/health", Duration::from_secs(2), None)?;
/// if prober.probe(8207).await == Probe::Alive {
///     println!("A backend is already listening");
/// }
/// # Ok(())
/// # }
/// ```
pub mod health;
pub mod launcher;
pub mod ledger;
pub mod lifecycle;
pub mod monitor;
pub mod owner;
pub(crate) mod process;
pub mod readiness;
pub mod shutdown;

pub use health::{HealthProber, Probe};
pub use launcher::{DevelopmentShell, LaunchOptions, PackagedRuntime, ProcessControl};
pub use ledger::{OwnershipLedger, SupervisorState, SupervisorStatus};
pub use lifecycle::{LifecycleEvent, LifecycleLog, LifecycleRecord};
pub use monitor::{BackendHealth, HealthTracker, MonitorConfig};
pub use owner::resolve_port_owner;
pub use process::{LaunchId, LauncherHandle};
pub use readiness::{Readiness, await_ready};
pub use shutdown::{ShutdownSequencer, StopOutcome};
