//! TCP port reclamation
//!
//! Before binding a managed process to its fixed port, terminate whatever
//! is still *listening* there - typically a stale instance from a previous
//! run. Only LISTEN-state processes are touched: the node holds outbound
//! connections to peers whose port numbers coincide with the wallet-api
//! port, and those must survive.

#[cfg(unix)]
use std::process::Command;
use std::time::Duration;

use crate::error::{SupervisorError, SupervisorResult};
use crate::process::spawn;

/// Terminate every process listening on `port`.
///
/// Idempotent: zero listeners is success. Fails only if a listener
/// survives the TERM/KILL escalation.
pub fn reclaim(port: u16) -> SupervisorResult<()> {
    let pids = listeners_on(port);
    if pids.is_empty() {
        return Ok(());
    }

    for pid in &pids {
        log::info!("Reclaiming port {}: terminating PID {}", port, pid);
        spawn::terminate_pid(*pid, Duration::from_secs(1));
    }

    let survivors = listeners_on(port);
    if survivors.is_empty() {
        Ok(())
    } else {
        Err(SupervisorError::ResourceBusy(format!(
            "port {} still held by pid(s) {:?} after reclaim",
            port, survivors
        )))
    }
}

/// PIDs in LISTEN state on a TCP port
#[cfg(unix)]
fn listeners_on(port: u16) -> Vec<u32> {
    // -sTCP:LISTEN restricts the match to listening sockets
    let output = Command::new("lsof")
        .args(["-ti", &format!("TCP:{}", port), "-sTCP:LISTEN"])
        .output();

    match output {
        Ok(out) => parse_pid_list(&String::from_utf8_lossy(&out.stdout)),
        Err(e) => {
            log::debug!("lsof unavailable while checking port {}: {}", port, e);
            Vec::new()
        }
    }
}

#[cfg(not(unix))]
fn listeners_on(_port: u16) -> Vec<u32> {
    Vec::new()
}

/// Parse the pid-per-line output of `lsof -ti`
pub(crate) fn parse_pid_list(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid_list() {
        assert_eq!(parse_pid_list("123\n456\n"), vec![123, 456]);
        assert_eq!(parse_pid_list("  789  \n"), vec![789]);
        assert_eq!(parse_pid_list(""), Vec::<u32>::new());
        assert_eq!(parse_pid_list("garbage\n42\n"), vec![42]);
    }

    #[test]
    fn test_reclaim_unused_port_is_idempotent() {
        // Nothing should be listening on this port; both calls are no-ops
        assert!(reclaim(59997).is_ok());
        assert!(reclaim(59997).is_ok());
    }
}
