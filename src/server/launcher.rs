//! Launch strategies for the backend process.
//!
//! A [`ProcessControl`] is selected once from the [`LaunchConfig`] and bundles
//! everything the orchestration needs from the OS: spawning the backend,
//! finding the pid that owns its port, checking liveness and terminating it.
//! This keeps the orchestration itself platform-agnostic.

use crate::config::{LaunchConfig, SupervisorConfig};
use crate::error::{Result, SpawnError};
use crate::server::owner;
use crate::server::process::{self, LauncherHandle};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// OS-facing operations used by the [`Supervisor`](crate::Supervisor).
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Short name for logs
    fn describe(&self) -> &'static str;

    /// Start the backend detached from the current process group.
    async fn spawn(&self, port: u16) -> std::result::Result<LauncherHandle, SpawnError>;

    /// Pid bound to `port`, if it can be determined.
    async fn resolve_owner(&self, port: u16) -> Option<u32>;

    /// Whether `pid` is still in the process table.
    async fn is_alive(&self, pid: u32) -> bool;

    /// Ask `pid` to exit; `force` kills it outright.
    async fn terminate(&self, pid: u32, force: bool) -> Result<()>;
}

/// Settings shared by both launch strategies
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Suppress console windows (Windows only)
    pub hide_windows: bool,
    /// Append backend output to this file instead of discarding it
    pub log_file: Option<PathBuf>,
}

impl LaunchOptions {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            hide_windows: config.hide_windows,
            log_file: config.log_file.clone(),
        }
    }
}

/// Build the strategy described by `config.launch`
pub fn for_config(config: &SupervisorConfig) -> Arc<dyn ProcessControl> {
    let options = LaunchOptions::from_config(config);
    match &config.launch {
        LaunchConfig::Packaged {
            interpreter,
            entry,
            extra_args,
        } => Arc::new(PackagedRuntime {
            interpreter: interpreter.clone(),
            entry: entry.clone(),
            extra_args: extra_args.clone(),
            options,
        }),
        LaunchConfig::Development {
            project_dir,
            run_command,
            port_env,
        } => Arc::new(DevelopmentShell {
            project_dir: project_dir.clone(),
            run_command: run_command.clone(),
            port_env: port_env.clone(),
            options,
        }),
    }
}

/// Runs a bundled entry artifact: `<interpreter> <entry> --port <port>`.
#[derive(Debug, Clone)]
pub struct PackagedRuntime {
    pub interpreter: String,
    pub entry: PathBuf,
    pub extra_args: Vec<String>,
    pub options: LaunchOptions,
}

impl PackagedRuntime {
    /// Absolute entry path and the folder it lives in
    fn locate_entry(&self) -> std::result::Result<(PathBuf, PathBuf), SpawnError> {
        let entry = std::fs::canonicalize(&self.entry).map_err(|_| SpawnError::EntryMissing {
            path: self.entry.clone(),
        })?;
        if !entry.is_file() {
            return Err(SpawnError::EntryMissing {
                path: self.entry.clone(),
            });
        }

        let dir = entry
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| SpawnError::WorkingDirMissing { path: entry.clone() })?;
        if !dir.is_dir() {
            return Err(SpawnError::WorkingDirMissing { path: dir });
        }
        Ok((entry, dir))
    }
}

#[async_trait]
impl ProcessControl for PackagedRuntime {
    fn describe(&self) -> &'static str {
        "packaged-runtime"
    }

    #[tracing::instrument(skip(self), fields(interpreter = %self.interpreter, entry = %self.entry.display()))]
    async fn spawn(&self, port: u16) -> std::result::Result<LauncherHandle, SpawnError> {
        let (entry, cwd) = self.locate_entry()?;

        let mut command = detached_command(&self.interpreter, &self.options)?;
        command
            .arg(&entry)
            .arg("--port")
            .arg(port.to_string())
            .args(&self.extra_args)
            .current_dir(&cwd);

        let child = command
            .spawn()
            .map_err(|e| SpawnError::from_io(&self.interpreter, e))?;
        let handle = LauncherHandle::new(child, self.interpreter.clone());
        tracing::info!(pid = handle.pid(), launch_id = %handle.id(), "Spawned packaged backend");
        Ok(handle)
    }

    async fn resolve_owner(&self, port: u16) -> Option<u32> {
        owner::resolve_port_owner(port).await
    }

    async fn is_alive(&self, pid: u32) -> bool {
        process::process_exists(pid).await
    }

    async fn terminate(&self, pid: u32, force: bool) -> Result<()> {
        process::signal_process(pid, force).await
    }
}

/// Runs the project's start command through the platform shell, with the
/// port in an environment variable.
#[derive(Debug, Clone)]
pub struct DevelopmentShell {
    pub project_dir: PathBuf,
    pub run_command: String,
    pub port_env: String,
    pub options: LaunchOptions,
}

#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd", "/C");
#[cfg(not(windows))]
const SHELL: (&str, &str) = ("sh", "-c");

#[async_trait]
impl ProcessControl for DevelopmentShell {
    fn describe(&self) -> &'static str {
        "development-shell"
    }

    #[tracing::instrument(skip(self), fields(command = %self.run_command, dir = %self.project_dir.display()))]
    async fn spawn(&self, port: u16) -> std::result::Result<LauncherHandle, SpawnError> {
        if !self.project_dir.is_dir() {
            return Err(SpawnError::WorkingDirMissing {
                path: self.project_dir.clone(),
            });
        }

        let (shell, flag) = SHELL;
        let mut command = detached_command(shell, &self.options)?;
        command
            .arg(flag)
            .arg(&self.run_command)
            .env(&self.port_env, port.to_string())
            .current_dir(&self.project_dir);

        let child = command.spawn().map_err(|e| SpawnError::from_io(shell, e))?;
        let handle = LauncherHandle::new(child, shell);
        tracing::info!(pid = handle.pid(), launch_id = %handle.id(), "Spawned development backend");
        Ok(handle)
    }

    async fn resolve_owner(&self, port: u16) -> Option<u32> {
        owner::resolve_port_owner(port).await
    }

    async fn is_alive(&self, pid: u32) -> bool {
        process::process_exists(pid).await
    }

    async fn terminate(&self, pid: u32, force: bool) -> Result<()> {
        process::signal_process(pid, force).await
    }
}

/// A command whose process outlives ours: own session on Unix, own process
/// group (and optionally no console) on Windows. Output goes to the log file
/// or nowhere, never to pipes we would stop draining on exit.
fn detached_command(program: &str, options: &LaunchOptions) -> std::result::Result<Command, SpawnError> {
    #[allow(unused_mut)]
    let mut detached = std::process::Command::new(program);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            detached.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        let mut flags = process::CREATE_NEW_PROCESS_GROUP;
        if options.hide_windows {
            flags |= process::CREATE_NO_WINDOW;
        }
        detached.creation_flags(flags);
    }

    // Stdio has to be set after the conversion, which resets it to inherit
    let mut command = Command::from(detached);
    command.stdin(Stdio::null());

    match &options.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SpawnError::Os {
                    command: format!("open {}", path.display()),
                    source: e,
                })?;
            let stderr = file.try_clone().map_err(|e| SpawnError::Os {
                command: format!("open {}", path.display()),
                source: e,
            })?;
            command.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    Ok(command)
}
