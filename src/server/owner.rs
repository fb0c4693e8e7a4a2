//! Port owner resolution.
//!
//! Maps a listening TCP port to the process id bound to it. On Unix this asks
//! `lsof`, falling back to `ss` where `lsof` is not installed; on Windows it
//! reads the `netstat -ano` connection table.
//!
//! The launcher's immediate child is frequently a shell or wrapper, so only the
//! pid found here is a legitimate shutdown target.

use crate::error::{Error, Result};
use crate::server::process::{quiet_command, run_query};

/// Resolve the pid listening on `port`.
///
/// Returns `None` when the tooling is unavailable or nothing is listening;
/// the failure is logged, never propagated.
#[tracing::instrument]
pub async fn resolve_port_owner(port: u16) -> Option<u32> {
    match query_port_owner(port).await {
        Ok(pid) => {
            tracing::debug!(pid, "Resolved port owner");
            Some(pid)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Port owner resolution failed");
            None
        }
    }
}

#[cfg(unix)]
async fn query_port_owner(port: u16) -> Result<u32> {
    let selector = format!("-iTCP:{}", port);
    let mut lsof = quiet_command("lsof");
    lsof.args(["-nP", selector.as_str(), "-sTCP:LISTEN", "-t"]);

    match run_query(lsof, "lsof").await {
        Ok(stdout) => {
            if let Some(pid) = parse_lsof_pids(&stdout) {
                return Ok(pid);
            }
        }
        Err(e) => tracing::debug!(error = %e, "lsof unavailable, trying ss"),
    }

    let mut ss = quiet_command("ss");
    let filter = format!("sport = :{}", port);
    ss.args(["-H", "-l", "-t", "-n", "-p", filter.as_str()]);

    let stdout = run_query(ss, "ss").await?;
    parse_ss_pid(&stdout).ok_or_else(|| Error::OwnerResolution(format!("no listener found on port {}", port)))
}

#[cfg(windows)]
async fn query_port_owner(port: u16) -> Result<u32> {
    let mut netstat = quiet_command("netstat");
    netstat.args(["-ano", "-p", "TCP"]);

    let stdout = run_query(netstat, "netstat").await?;
    parse_netstat_owner(&stdout, port)
        .ok_or_else(|| Error::OwnerResolution(format!("no listener found on port {}", port)))
}

#[cfg(not(any(unix, windows)))]
async fn query_port_owner(port: u16) -> Result<u32> {
    Err(Error::OwnerResolution(format!(
        "port owner lookup is not supported on this platform (port {})",
        port
    )))
}

/// First pid printed by `lsof -t`
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn parse_lsof_pids(output: &str) -> Option<u32> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.parse::<u32>().ok())
        .filter(|pid| *pid != 0)
}

/// First `pid=<n>` in `ss -p` output
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn parse_ss_pid(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let start = line.find("pid=")? + "pid=".len();
        let digits: String = line[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<u32>().ok().filter(|pid| *pid != 0)
    })
}

/// Pid of the `LISTENING` row whose local address ends in `:<port>`
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_netstat_owner(output: &str, port: u16) -> Option<u32> {
    output.lines().find_map(|line| {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [proto, local, _remote, state, pid] = columns.as_slice() else {
            return None;
        };
        if !proto.eq_ignore_ascii_case("TCP") || !state.eq_ignore_ascii_case("LISTENING") {
            return None;
        }

        let (_, local_port) = local.rsplit_once(':')?;
        if local_port.parse::<u16>().ok()? != port {
            return None;
        }

        pid.parse::<u32>().ok().filter(|pid| *pid != 0)
    })
}
