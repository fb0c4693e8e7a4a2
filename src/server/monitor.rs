use crate::server::health::Probe;
use std::time::Duration;

/// Backend health as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    /// Last probe answered
    Healthy,
    /// Some probes failed, but fewer than the threshold
    Degraded,
    /// Enough consecutive failures to consider the backend gone
    Lost,
}

/// Liveness monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between probes
    pub check_interval: Duration,
    /// Consecutive failed probes before the backend counts as lost
    pub max_consecutive_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

/// Consecutive-failure counter behind the monitor loop
#[derive(Debug)]
pub struct HealthTracker {
    failures: u32,
    threshold: u32,
}

impl HealthTracker {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            failures: 0,
            threshold: config.max_consecutive_failures.max(1),
        }
    }

    /// Fold one probe result into the current health
    pub fn observe(&mut self, probe: Probe) -> BackendHealth {
        match probe {
            Probe::Alive => {
                self.failures = 0;
                BackendHealth::Healthy
            }
            Probe::Absent => {
                self.failures = self.failures.saturating_add(1);
                if self.failures >= self.threshold {
                    BackendHealth::Lost
                } else {
                    BackendHealth::Degraded
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_needs_consecutive_failures() {
        let mut tracker = HealthTracker::new(&MonitorConfig {
            check_interval: Duration::from_millis(10),
            max_consecutive_failures: 2,
        });

        assert_eq!(tracker.observe(Probe::Absent), BackendHealth::Degraded);
        assert_eq!(tracker.observe(Probe::Alive), BackendHealth::Healthy);
        assert_eq!(tracker.observe(Probe::Absent), BackendHealth::Degraded);
        assert_eq!(tracker.observe(Probe::Absent), BackendHealth::Lost);
    }

    #[test]
    fn test_zero_threshold_is_treated_as_one() {
        let mut tracker = HealthTracker::new(&MonitorConfig {
            check_interval: Duration::from_millis(10),
            max_consecutive_failures: 0,
        });
        assert_eq!(tracker.observe(Probe::Absent), BackendHealth::Lost);
    }
}
