mod common;

use async_trait::async_trait;
use backend_supervisor::error::{Error, Result, SpawnError};
use backend_supervisor::server::{LauncherHandle, LifecycleEvent, MonitorConfig, ProcessControl};
use backend_supervisor::{StartOutcome, StopOutcome, Supervisor, SupervisorState};
use common::{fake_backend, fast_config, free_port, serve_on};
use mockall::mock;
use mockall::predicate::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

mock! {
    pub Control {}

    #[async_trait]
    impl ProcessControl for Control {
        fn describe(&self) -> &'static str;
        async fn spawn(&self, port: u16) -> std::result::Result<LauncherHandle, SpawnError>;
        async fn resolve_owner(&self, port: u16) -> Option<u32>;
        async fn is_alive(&self, pid: u32) -> bool;
        async fn terminate(&self, pid: u32, force: bool) -> Result<()>;
    }
}

fn mock_control() -> MockControl {
    let mut control = MockControl::new();
    control.expect_describe().return_const("mock");
    control
}

fn supervisor(port: u16, control: MockControl) -> Supervisor {
    Supervisor::with_control(fast_config(port), Arc::new(control)).expect("supervisor")
}

/// A harmless long-running child standing in for the launcher wrapper
#[cfg(unix)]
fn sleeper() -> LauncherHandle {
    let child = async_process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");
    LauncherHandle::new(child, "sleep")
}

#[tokio::test]
async fn test_reuses_live_backend_without_spawning() -> Result<()> {
    let (port, server) = fake_backend("401 Unauthorized");

    let mut control = mock_control();
    control.expect_spawn().times(0);
    control
        .expect_resolve_owner()
        .with(eq(port))
        .times(1)
        .returning(|_| Some(4242));

    let supervisor = supervisor(port, control);
    let outcome = supervisor.start(Some(port)).await?;

    assert_eq!(outcome, StartOutcome::Reused { owner_pid: Some(4242) });
    let status = supervisor.status();
    assert!(status.is_running());
    assert!(!status.owned);
    assert_eq!(status.owner_pid, Some(4242));
    assert_eq!(supervisor.backend_url(), format!("http://127.0.0.1:{}", port));

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_stop_never_signals_reused_backend() -> Result<()> {
    let (port, server) = fake_backend("200 OK");

    let mut control = mock_control();
    control.expect_resolve_owner().returning(|_| Some(4242));
    control.expect_terminate().times(0);
    control.expect_is_alive().times(0);

    let supervisor = supervisor(port, control);
    supervisor.start(None).await?;

    let outcome = supervisor.stop().await;

    assert_eq!(outcome, StopOutcome::Detached { owner_pid: Some(4242) });
    assert!(outcome.may_be_running());
    assert!(!supervisor.is_running());

    let events = supervisor.lifecycle().events(None)?;
    assert_eq!(events[0].event, LifecycleEvent::Detached);
    assert_eq!(events[1].event, LifecycleEvent::Reused);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_spawn_error_is_surfaced() {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|_| {
        Err(SpawnError::CommandNotFound {
            command: "node".to_string(),
        })
    });
    control.expect_resolve_owner().times(0);

    let supervisor = supervisor(port, control);
    let err = supervisor.start(None).await.unwrap_err();

    match err {
        Error::Spawn(SpawnError::CommandNotFound { command }) => assert_eq!(command, "node"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(supervisor.status().state, SupervisorState::Idle);
    assert!(!supervisor.status().owned);
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let mut control = mock_control();
    control.expect_terminate().times(0);

    let supervisor = supervisor(free_port(), control);
    assert_eq!(supervisor.stop().await, StopOutcome::NotRunning);
}

#[cfg(unix)]
#[tokio::test]
async fn test_spawn_then_ready_is_owned() -> Result<()> {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().with(eq(port)).times(1).returning(|port| {
        serve_on(port, "200 OK");
        Ok(sleeper())
    });
    control.expect_resolve_owner().times(1).returning(|_| Some(31337));

    let supervisor = supervisor(port, control);
    let outcome = supervisor.start(Some(port)).await?;

    match outcome {
        StartOutcome::Spawned { owner_pid, .. } => assert_eq!(owner_pid, Some(31337)),
        other => panic!("expected spawn, got {:?}", other),
    }
    let status = supervisor.status();
    assert!(status.is_running());
    assert!(status.owned);
    assert_eq!(status.owner_pid, Some(31337));
    assert!(status.launch_id.is_some());

    // Second call short-circuits without spawning again
    assert_eq!(supervisor.start(Some(port)).await?, StartOutcome::AlreadyRunning);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_concurrent_starts_spawn_once() -> Result<()> {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|port| {
        serve_on(port, "200 OK");
        Ok(sleeper())
    });
    control.expect_resolve_owner().returning(|_| Some(31337));

    let supervisor = supervisor(port, control);
    let (first, second) = futures::future::join(supervisor.start(None), supervisor.start(None)).await;

    let outcomes = [first?, second?];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, StartOutcome::Spawned { .. }))
            .count(),
        1
    );
    assert!(outcomes.contains(&StartOutcome::AlreadyRunning));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_readiness_timeout_is_distinct_from_spawn_error() {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|_| Ok(sleeper()));
    control.expect_resolve_owner().times(0);

    let mut config = fast_config(port);
    config.startup_deadline_ms = 300;
    let supervisor = Supervisor::with_control(config, Arc::new(control)).expect("supervisor");

    let err = supervisor.start(None).await.unwrap_err();

    assert!(matches!(err, Error::Timeout { port: p, .. } if p == port));
    assert!(err.suggestion().is_some());
    assert!(!supervisor.is_running());

    let events = supervisor.lifecycle().events(None).expect("events");
    assert_eq!(events[0].event, LifecycleEvent::StartFailed);
    assert_eq!(events[1].event, LifecycleEvent::Spawned);
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_owned_backend_gracefully() -> Result<()> {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|port| {
        serve_on(port, "200 OK");
        Ok(sleeper())
    });
    control.expect_resolve_owner().returning(|_| Some(31337));
    control
        .expect_terminate()
        .with(eq(31337), eq(false))
        .times(1)
        .returning(|_, _| Ok(()));
    control.expect_terminate().with(always(), eq(true)).times(0);
    control.expect_is_alive().with(eq(31337)).returning(|_| false);

    let supervisor = supervisor(port, control);
    supervisor.start(None).await?;

    let outcome = supervisor.stop().await;

    assert_eq!(outcome, StopOutcome::Terminated { pid: 31337, forced: false });
    assert!(!supervisor.is_running());
    assert!(!supervisor.status().owned);

    let events = supervisor.lifecycle().events(Some(1))?;
    assert_eq!(events[0].event, LifecycleEvent::Stopped);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_escalates_when_backend_ignores_graceful_signal() -> Result<()> {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|port| {
        serve_on(port, "200 OK");
        Ok(sleeper())
    });
    control.expect_resolve_owner().returning(|_| Some(31337));
    control
        .expect_terminate()
        .with(eq(31337), eq(false))
        .times(1)
        .returning(|_, _| Ok(()));
    control
        .expect_terminate()
        .with(eq(31337), eq(true))
        .times(1)
        .returning(|_, _| Ok(()));

    // Alive on the post-grace check, gone after the kill
    let checks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&checks);
    control
        .expect_is_alive()
        .returning(move |_| counter.fetch_add(1, Ordering::SeqCst) == 0);

    let supervisor = supervisor(port, control);
    supervisor.start(None).await?;

    let outcome = supervisor.stop().await;

    assert_eq!(outcome, StopOutcome::Terminated { pid: 31337, forced: true });
    assert!(checks.load(Ordering::SeqCst) >= 2);
    assert!(!supervisor.is_running());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_without_owner_pid_leaves_process_alone() -> Result<()> {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|port| {
        serve_on(port, "200 OK");
        Ok(sleeper())
    });
    // Once after readiness, once more at stop time
    control.expect_resolve_owner().times(2).returning(|_| None);
    control.expect_terminate().times(0);

    let supervisor = supervisor(port, control);
    let outcome = supervisor.start(None).await?;
    assert!(matches!(outcome, StartOutcome::Spawned { owner_pid: None, .. }));
    assert!(supervisor.is_running());

    let stopped = supervisor.stop().await;

    assert_eq!(stopped, StopOutcome::OwnerUnknown);
    assert!(stopped.may_be_running());
    assert!(!supervisor.is_running());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_background_start_is_joined() -> Result<()> {
    let port = free_port();

    let mut control = mock_control();
    control.expect_spawn().times(1).returning(|port| {
        serve_on(port, "200 OK");
        Ok(sleeper())
    });
    control.expect_resolve_owner().returning(|_| Some(31337));

    let supervisor = supervisor(port, control);
    let mut status = supervisor.subscribe();

    assert!(supervisor.start_in_background(None));

    let result = supervisor.join_start().await.expect("a pending start");
    assert!(matches!(result?, StartOutcome::Spawned { .. }));
    assert!(supervisor.is_running());
    assert!(status.has_changed().unwrap_or(false));
    assert!(status.borrow_and_update().is_running());

    assert!(supervisor.join_start().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_monitor_forgets_backend_that_disappears() -> Result<()> {
    let (port, server) = fake_backend("200 OK");

    let mut control = mock_control();
    control.expect_resolve_owner().returning(|_| None);
    control.expect_terminate().times(0);

    let supervisor = supervisor(port, control);
    supervisor.start(None).await?;
    supervisor.spawn_monitor(MonitorConfig {
        check_interval: Duration::from_millis(50),
        max_consecutive_failures: 2,
    });

    server.abort();

    let mut status = supervisor.subscribe();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| !s.is_running()))
        .await
        .expect("monitor noticed the backend vanished")
        .expect("status channel open");

    let events = supervisor.lifecycle().events(Some(1))?;
    assert_eq!(events[0].event, LifecycleEvent::Lost);

    assert_eq!(supervisor.shutdown().await, StopOutcome::NotRunning);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_monitor_keeps_hung_owned_backend_for_shutdown() -> Result<()> {
    let port = free_port();
    let server = Arc::new(std::sync::Mutex::new(None));

    let mut control = mock_control();
    let serving = Arc::clone(&server);
    control.expect_spawn().times(1).returning(move |port| {
        *serving.lock().unwrap() = Some(serve_on(port, "200 OK"));
        Ok(sleeper())
    });
    control.expect_resolve_owner().returning(|_| Some(31337));

    // The process stays in the table until it is signalled
    let signalled = Arc::new(AtomicBool::new(false));
    let on_terminate = Arc::clone(&signalled);
    control
        .expect_terminate()
        .with(eq(31337), eq(false))
        .times(1)
        .returning(move |_, _| {
            on_terminate.store(true, Ordering::SeqCst);
            Ok(())
        });
    let alive = Arc::clone(&signalled);
    control
        .expect_is_alive()
        .with(eq(31337))
        .returning(move |_| !alive.load(Ordering::SeqCst));

    let supervisor = supervisor(port, control);
    supervisor.start(None).await?;
    supervisor.spawn_monitor(MonitorConfig {
        check_interval: Duration::from_millis(50),
        max_consecutive_failures: 2,
    });

    // Stops answering without exiting
    if let Some(handle) = server.lock().unwrap().take() {
        handle.abort();
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let events = supervisor.lifecycle().events(Some(1)).expect("events");
            if events.first().map(|record| record.event) == Some(LifecycleEvent::Unresponsive) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("monitor noticed the backend stopped answering");

    let status = supervisor.status();
    assert!(status.is_running());
    assert!(status.owned);
    assert_eq!(status.owner_pid, Some(31337));

    assert_eq!(
        supervisor.shutdown().await,
        StopOutcome::Terminated { pid: 31337, forced: false }
    );
    assert!(signalled.load(Ordering::SeqCst));
    assert!(!supervisor.is_running());
    Ok(())
}
