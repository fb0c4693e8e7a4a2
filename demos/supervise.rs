use backend_supervisor::diagnostics::diagnose_start_failure;
use backend_supervisor::error::Result;
use backend_supervisor::server::MonitorConfig;
use backend_supervisor::{LaunchConfig, Supervisor, SupervisorConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=backend_supervisor=debug for the full picture
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    // Either a config file, or the development server next to this checkout
    let config = match std::env::args().nth(1) {
        Some(path) => SupervisorConfig::from_file(&path)?,
        None => {
            let development = LaunchConfig::Development {
                project_dir: PathBuf::from("../server"),
                run_command: "npm run start".to_string(),
                port_env: "PORT".to_string(),
            };
            let launch = LaunchConfig::resolve(Path::new("resources"), "server.js", "node", development);
            SupervisorConfig::new(launch)
        }
    }
    .with_env_overrides()?;

    let supervisor = Supervisor::new(config)?;

    println!("Starting backend...");
    match supervisor.start(None).await {
        Ok(outcome) => println!("{:?}: backend at {}", outcome, supervisor.backend_url()),
        Err(e) => {
            let diagnosis = diagnose_start_failure(&e, &supervisor.config().launch).await;
            eprintln!("Backend failed to start: {}", diagnosis.message());
            if let Some(hint) = e.suggestion() {
                eprintln!("Hint: {}", hint);
            }
            return Err(e);
        }
    }

    supervisor.spawn_monitor(MonitorConfig::default());

    println!("Press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl+C");
    }

    let outcome = supervisor.shutdown().await;
    println!("Stopped: {:?}", outcome);
    if outcome.may_be_running() {
        println!("The backend may still be running (it was not started by us, or its pid was unknown)");
    }

    Ok(())
}
