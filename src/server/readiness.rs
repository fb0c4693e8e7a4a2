use crate::server::health::HealthProber;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Result of waiting for a freshly launched backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The port answered after `elapsed`
    Ready { elapsed: Duration },
    /// Nothing answered before the deadline
    TimedOut { waited: Duration },
}

/// Poll `port` every `interval` until it answers or `deadline` passes.
///
/// The first probe is issued immediately.
#[tracing::instrument(skip(prober))]
pub async fn await_ready(
    prober: &HealthProber,
    port: u16,
    interval: Duration,
    deadline: Duration,
) -> Readiness {
    let started = Instant::now();

    loop {
        if prober.probe(port).await.is_alive() {
            let elapsed = started.elapsed();
            tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Backend is ready");
            return Readiness::Ready { elapsed };
        }

        let elapsed = started.elapsed();
        if elapsed >= deadline {
            tracing::warn!(waited_ms = elapsed.as_millis() as u64, "Backend did not become ready");
            return Readiness::TimedOut { waited: elapsed };
        }

        time::sleep(interval.min(deadline - elapsed)).await;
    }
}
