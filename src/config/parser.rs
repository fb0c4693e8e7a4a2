use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port the backend listens on unless the caller picks another one.
pub const DEFAULT_PORT: u16 = 8207;

/// Liveness path served by the backend.
pub const DEFAULT_HEALTH_PATH: &str = "/api/health";

/// Environment variable that overrides the configured port.
pub const PORT_OVERRIDE_ENV: &str = "BACKEND_SUPERVISOR_PORT";

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_health_path() -> String {
    DEFAULT_HEALTH_PATH.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_startup_deadline_ms() -> u64 {
    10_000
}

fn default_grace_period_ms() -> u64 {
    400
}

fn default_kill_timeout_ms() -> u64 {
    3_000
}

fn default_true() -> bool {
    true
}

fn default_port_env() -> String {
    "PORT".to_string()
}

/// How the backend process is launched.
///
/// The variant is chosen once by the application, usually through
/// [`LaunchConfig::resolve`], and never changes for the lifetime of a
/// supervisor.
///
/// # Examples
///
/// ```
/// use backend_supervisor::config::LaunchConfig;
///
/// let launch = LaunchConfig::Packaged {
///     interpreter: "node".to_string(),
///     entry: "/opt/app/server/index.js".into(),
///     extra_args: vec![],
/// };
/// assert!(launch.is_packaged());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LaunchConfig {
    /// Run a bundled entry artifact with an interpreter.
    ///
    /// The port is passed as `--port <port>` and the working directory is the
    /// folder containing `entry`.
    Packaged {
        interpreter: String,
        entry: PathBuf,
        #[serde(default)]
        extra_args: Vec<String>,
    },
    /// Run the project's own start command through the platform shell.
    ///
    /// The port is handed over in the `port_env` environment variable.
    Development {
        project_dir: PathBuf,
        run_command: String,
        #[serde(default = "default_port_env")]
        port_env: String,
    },
}

impl LaunchConfig {
    /// Pick packaged mode when `entry_name` exists inside `app_dir`, otherwise
    /// fall back to `development`.
    pub fn resolve(
        app_dir: &Path,
        entry_name: &str,
        interpreter: &str,
        development: LaunchConfig,
    ) -> LaunchConfig {
        let entry = app_dir.join(entry_name);
        if entry.is_file() {
            tracing::debug!(entry = %entry.display(), "Found packaged backend artifact");
            LaunchConfig::Packaged {
                interpreter: interpreter.to_string(),
                entry,
                extra_args: Vec::new(),
            }
        } else {
            tracing::debug!(
                entry = %entry.display(),
                "No packaged backend artifact, using development launch"
            );
            development
        }
    }

    /// Whether this is the packaged-runtime variant.
    pub fn is_packaged(&self) -> bool {
        matches!(self, LaunchConfig::Packaged { .. })
    }

    /// The program that will be executed first.
    pub fn program(&self) -> &str {
        match self {
            LaunchConfig::Packaged { interpreter, .. } => interpreter,
            LaunchConfig::Development { run_command, .. } => run_command,
        }
    }
}

/// Configuration for a [`Supervisor`](crate::Supervisor).
///
/// All timings are stored in milliseconds so the file format stays flat;
/// use the accessor methods to get [`Duration`]s.
///
/// # JSON Schema
///
/// ```json
/// {
///   "port": 8207,
///   "healthPath": "/api/health",
///   "startupDeadlineMs": 10000,
///   "launch": {
///     "mode": "development",
///     "projectDir": "../server",
///     "runCommand": "npm run start"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Port the backend is expected to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Liveness path probed on `127.0.0.1:<port>`.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Bearer token attached to probes, if the backend expects one.
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_startup_deadline_ms")]
    pub startup_deadline_ms: u64,

    /// Time between the graceful signal and the liveness re-check.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// How long to wait for the process to vanish after a forceful kill.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// Suppress console windows for the launched process (Windows only).
    #[serde(default = "default_true")]
    pub hide_windows: bool,

    /// File that receives the backend's stdout and stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    pub launch: LaunchConfig,
}

impl SupervisorConfig {
    /// Create a configuration with default timings for the given launch mode.
    pub fn new(launch: LaunchConfig) -> Self {
        Self {
            port: default_port(),
            health_path: default_health_path(),
            auth_token: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            startup_deadline_ms: default_startup_deadline_ms(),
            grace_period_ms: default_grace_period_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            hide_windows: true,
            log_file: None,
            launch,
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Apply `BACKEND_SUPERVISOR_PORT` if it is set.
    pub fn with_env_overrides(self) -> Result<Self> {
        match std::env::var(PORT_OVERRIDE_ENV) {
            Ok(value) => self.with_port_override(&value),
            Err(_) => Ok(self),
        }
    }

    fn with_port_override(mut self, value: &str) -> Result<Self> {
        self.port = value.trim().parse().map_err(|_| {
            Error::ConfigInvalid(format!("{} must be a port number, got '{}'", PORT_OVERRIDE_ENV, value))
        })?;
        Ok(self)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn startup_deadline(&self) -> Duration {
        Duration::from_millis(self.startup_deadline_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config_str = r#"{
            "launch": {
                "mode": "packaged",
                "interpreter": "node",
                "entry": "/opt/app/server/index.js"
            }
        }"#;

        let config = SupervisorConfig::parse_from_str(config_str).unwrap();

        assert_eq!(config.port, 8207);
        assert_eq!(config.health_path, "/api/health");
        assert_eq!(config.startup_deadline(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert!(config.hide_windows);
        assert!(config.launch.is_packaged());
    }

    #[test]
    fn test_port_override() {
        let config = SupervisorConfig::new(LaunchConfig::Development {
            project_dir: ".".into(),
            run_command: "npm start".to_string(),
            port_env: "PORT".to_string(),
        });

        let config = config.with_port_override(" 9100 ").unwrap();
        assert_eq!(config.port, 9100);
        assert!(config.with_port_override("not-a-port").is_err());
    }
}
