use crate::config::{LaunchConfig, SupervisorConfig};
use crate::error::{Error, Result};

/// Validates the launch section
pub fn validate_launch_config(launch: &LaunchConfig) -> Result<()> {
    match launch {
        LaunchConfig::Packaged {
            interpreter, entry, ..
        } => {
            if interpreter.trim().is_empty() {
                return Err(Error::ConfigInvalid("Packaged launch has empty interpreter".to_string()));
            }
            if entry.as_os_str().is_empty() {
                return Err(Error::ConfigInvalid("Packaged launch has empty entry".to_string()));
            }
        }
        LaunchConfig::Development {
            run_command,
            port_env,
            ..
        } => {
            if run_command.trim().is_empty() {
                return Err(Error::ConfigInvalid(
                    "Development launch has empty run command".to_string(),
                ));
            }
            if port_env.is_empty() || port_env.contains('=') {
                return Err(Error::ConfigInvalid(format!(
                    "Invalid port environment variable name '{}'",
                    port_env
                )));
            }
        }
    }

    // Whether the files exist is checked at spawn time, where it becomes a typed SpawnError.
    Ok(())
}

/// Validates timings and probe settings
pub fn validate_timings(config: &SupervisorConfig) -> Result<()> {
    if config.probe_timeout_ms == 0 || config.poll_interval_ms == 0 || config.startup_deadline_ms == 0 {
        return Err(Error::ConfigInvalid(
            "Probe timeout, poll interval and startup deadline must be non-zero".to_string(),
        ));
    }

    if config.poll_interval_ms > config.startup_deadline_ms {
        return Err(Error::ConfigInvalid(format!(
            "Poll interval ({}ms) exceeds startup deadline ({}ms)",
            config.poll_interval_ms, config.startup_deadline_ms
        )));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &SupervisorConfig) -> Result<()> {
    if config.port == 0 {
        return Err(Error::ConfigInvalid("Port must be non-zero".to_string()));
    }

    if !config.health_path.starts_with('/') {
        return Err(Error::ConfigInvalid(format!(
            "Health path '{}' must start with '/'",
            config.health_path
        )));
    }

    validate_timings(config)?;
    validate_launch_config(&config.launch)?;

    Ok(())
}
