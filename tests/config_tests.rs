use backend_supervisor::config::{LaunchConfig, SupervisorConfig, validate_config};
use backend_supervisor::error::Result;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_parse_development_config() -> Result<()> {
    let config_str = r#"{
        "port": 9100,
        "healthPath": "/healthz",
        "authToken": "secret",
        "startupDeadlineMs": 15000,
        "hideWindows": false,
        "launch": {
            "mode": "development",
            "projectDir": "../server",
            "runCommand": "npm run start"
        }
    }"#;

    let config = SupervisorConfig::parse_from_str(config_str)?;

    assert_eq!(config.port, 9100);
    assert_eq!(config.health_path, "/healthz");
    assert_eq!(config.auth_token.as_deref(), Some("secret"));
    assert_eq!(config.startup_deadline_ms, 15_000);
    assert_eq!(config.poll_interval_ms, 500);
    assert!(!config.hide_windows);

    match &config.launch {
        LaunchConfig::Development {
            project_dir,
            run_command,
            port_env,
        } => {
            assert_eq!(project_dir, &PathBuf::from("../server"));
            assert_eq!(run_command, "npm run start");
            assert_eq!(port_env, "PORT");
        }
        other => panic!("expected development launch, got {:?}", other),
    }

    validate_config(&config)?;
    Ok(())
}

#[test]
fn test_parse_yaml_file() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("supervisor.yaml");
    std::fs::write(
        &path,
        "port: 8300\nlaunch:\n  mode: packaged\n  interpreter: node\n  entry: server/index.js\n  extraArgs: [\"--quiet\"]\n",
    )
    .expect("write config");

    let config = SupervisorConfig::from_file(&path)?;

    assert_eq!(config.port, 8300);
    assert_eq!(
        config.launch,
        LaunchConfig::Packaged {
            interpreter: "node".to_string(),
            entry: PathBuf::from("server/index.js"),
            extra_args: vec!["--quiet".to_string()],
        }
    );
    Ok(())
}

#[test]
fn test_missing_file_is_parse_error() {
    let err = SupervisorConfig::from_file("/definitely/not/here.json").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_validate_config() -> Result<()> {
    let valid = SupervisorConfig::new(LaunchConfig::Packaged {
        interpreter: "node".to_string(),
        entry: PathBuf::from("index.js"),
        extra_args: vec![],
    });
    validate_config(&valid)?;

    let mut zero_port = valid.clone();
    zero_port.port = 0;
    assert!(validate_config(&zero_port).is_err());

    let mut bad_path = valid.clone();
    bad_path.health_path = "health".to_string();
    assert!(validate_config(&bad_path).is_err());

    let mut slow_poll = valid.clone();
    slow_poll.poll_interval_ms = 20_000;
    assert!(validate_config(&slow_poll).is_err());

    let mut empty_interpreter = valid.clone();
    empty_interpreter.launch = LaunchConfig::Packaged {
        interpreter: " ".to_string(),
        entry: PathBuf::from("index.js"),
        extra_args: vec![],
    };
    assert!(validate_config(&empty_interpreter).is_err());

    let mut empty_command = valid;
    empty_command.launch = LaunchConfig::Development {
        project_dir: PathBuf::from("."),
        run_command: String::new(),
        port_env: "PORT".to_string(),
    };
    assert!(validate_config(&empty_command).is_err());

    Ok(())
}

#[test]
fn test_resolve_prefers_packaged_artifact() {
    let dir = tempdir().expect("tempdir");
    let development = LaunchConfig::Development {
        project_dir: PathBuf::from("../server"),
        run_command: "npm run start".to_string(),
        port_env: "PORT".to_string(),
    };

    let resolved = LaunchConfig::resolve(dir.path(), "server.js", "node", development.clone());
    assert_eq!(resolved, development);

    std::fs::write(dir.path().join("server.js"), "// bundle").expect("write artifact");
    let resolved = LaunchConfig::resolve(dir.path(), "server.js", "node", development);
    assert!(resolved.is_packaged());
    assert_eq!(resolved.program(), "node");
}
