#![allow(dead_code)]

use backend_supervisor::config::{LaunchConfig, SupervisorConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A port nothing is listening on right now
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Serve `status_line` to every connection on `port`.
///
/// Must be called from inside a tokio runtime.
pub fn serve_on(port: u16, status_line: &'static str) -> JoinHandle<()> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", port)).expect("bind fake backend");
    listener.set_nonblocking(true).expect("nonblocking");
    let listener = TcpListener::from_std(listener).expect("tokio listener");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    })
}

/// Start a fake backend on a fresh port
pub fn fake_backend(status_line: &'static str) -> (u16, JoinHandle<()>) {
    let port = free_port();
    (port, serve_on(port, status_line))
}

/// Config with short timings, suitable for tests
pub fn fast_config(port: u16) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(LaunchConfig::Development {
        project_dir: std::env::temp_dir(),
        run_command: "true".to_string(),
        port_env: "PORT".to_string(),
    });
    config.port = port;
    config.probe_timeout_ms = 200;
    config.poll_interval_ms = 50;
    config.startup_deadline_ms = 2_000;
    config.grace_period_ms = 50;
    config.kill_timeout_ms = 500;
    config
}
