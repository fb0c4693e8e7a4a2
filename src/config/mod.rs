//! Configuration module for the backend supervisor.
//!
//! This module handles parsing, validation, and access to the settings that
//! control how the backend is launched, probed and stopped. Configurations can
//! be loaded from JSON or YAML files, or built programmatically.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use backend_supervisor::config::SupervisorConfig;
//!
//! let config = SupervisorConfig::from_file("supervisor.json").unwrap();
//! println!("Backend port: {}", config.port);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use backend_supervisor::config::{LaunchConfig, SupervisorConfig};
//!
//! let launch = LaunchConfig::Development {
//!     project_dir: "../server".into(),
//!     run_command: "npm run start".to_string(),
//!     port_env: "PORT".to_string(),
//! };
//! let config = SupervisorConfig::new(launch);
//! assert_eq!(config.port, 8207);
//! ```
mod parser;
pub mod validator;

pub use parser::{
    DEFAULT_HEALTH_PATH, DEFAULT_PORT, LaunchConfig, PORT_OVERRIDE_ENV, SupervisorConfig,
};
pub use validator::validate_config;
