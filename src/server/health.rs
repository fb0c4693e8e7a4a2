//! Health prober - decides whether a backend is bound to a port
//!
//! Issues one HTTP request to the liveness path on `127.0.0.1:<port>`. Any
//! HTTP response, including 401/403, proves that a server speaking the expected
//! protocol owns the port; only transport failures count as absent.

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use std::time::Duration;

/// Outcome of a single liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Something answered with an HTTP response
    Alive,
    /// Connection refused, timed out, or the peer did not speak HTTP
    Absent,
}

impl Probe {
    pub fn is_alive(self) -> bool {
        self == Probe::Alive
    }
}

/// Liveness prober for the backend port.
///
/// Cheap to clone; clones share the underlying connection pool. Safe to call
/// repeatedly and concurrently.
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: reqwest::Client,
    health_path: String,
    auth_token: Option<String>,
}

impl HealthProber {
    pub fn new(health_path: impl Into<String>, timeout: Duration, auth_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client for health probes: {}", e)))?;

        Ok(Self {
            client,
            health_path: health_path.into(),
            auth_token,
        })
    }

    pub fn from_config(config: &SupervisorConfig) -> Result<Self> {
        Self::new(
            config.health_path.clone(),
            config.probe_timeout(),
            config.auth_token.clone(),
        )
    }

    /// Liveness URL for `port`
    pub fn url(&self, port: u16) -> String {
        format!("http://127.0.0.1:{}{}", port, self.health_path)
    }

    /// Probe `port` once
    pub async fn probe(&self, port: u16) -> Probe {
        let url = self.url(port);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(resp) => {
                tracing::trace!(port, status = %resp.status(), "Health probe answered");
                Probe::Alive
            }
            Err(e) => {
                tracing::trace!(port, error = %e, "Health probe found nothing");
                Probe::Absent
            }
        }
    }
}
