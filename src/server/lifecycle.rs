use crate::error::{Error, Result};
use crate::server::process::LaunchId;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

const MAX_EVENTS: usize = 1000;

/// Backend lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A launcher process was created
    Spawned,
    /// A pre-existing backend was adopted without ownership
    Reused,
    /// Our spawned backend answered its first probe
    Ready,
    /// Spawn failed or readiness timed out
    StartFailed,
    /// An owned backend was shut down
    Stopped,
    /// Tracking of a backend ended without signalling it
    Detached,
    /// Our backend stopped answering but its process is still alive
    Unresponsive,
    /// A running backend stopped answering
    Lost,
}

/// One entry in the lifecycle history
#[derive(Debug, Clone)]
pub struct LifecycleRecord {
    /// Launch attempt, absent for reused backends
    pub launch_id: Option<LaunchId>,
    pub port: u16,
    pub event: LifecycleEvent,
    pub timestamp: Instant,
    pub details: Option<String>,
}

/// Bounded history of backend lifecycle events, for diagnostics screens
pub struct LifecycleLog {
    events: Mutex<VecDeque<LifecycleRecord>>,
}

impl LifecycleLog {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Record an event
    pub fn record(
        &self,
        launch_id: Option<LaunchId>,
        port: u16,
        event: LifecycleEvent,
        details: Option<String>,
    ) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle events".to_string()))?;

        events.push_back(LifecycleRecord {
            launch_id,
            port,
            event,
            timestamp: Instant::now(),
            details,
        });

        if events.len() > MAX_EVENTS {
            events.pop_front();
        }

        Ok(())
    }

    /// Recent events, newest first
    pub fn events(&self, limit: Option<usize>) -> Result<Vec<LifecycleRecord>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle events".to_string()))?;

        let limit = limit.unwrap_or(usize::MAX);
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    /// Events belonging to one launch attempt, newest first
    pub fn events_for(&self, launch_id: LaunchId) -> Result<Vec<LifecycleRecord>> {
        Ok(self
            .events(None)?
            .into_iter()
            .filter(|record| record.launch_id == Some(launch_id))
            .collect())
    }

    pub fn clear(&self) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle events".to_string()))?
            .clear();
        Ok(())
    }
}

impl Default for LifecycleLog {
    fn default() -> Self {
        Self::new()
    }
}
