//! Process-table lookups
//!
//! Finds managed processes by name and command-line fragment so the
//! supervisor can re-discover them after its own restart.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Find the PID of a process whose name contains `name` and whose command
/// line contains `arg_fragment`.
///
/// Matching on the port argument keeps this from confusing an unrelated
/// instance (or a user's own node) with the supervised one.
pub fn find_pid(name: &str, arg_fragment: &str) -> Option<u32> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

    for (pid, process) in sys.processes() {
        let proc_name = process.name().to_string_lossy().to_lowercase();
        if !proc_name.contains(&name.to_lowercase()) {
            continue;
        }
        let cmdline = process
            .cmd()
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if cmdline.contains(arg_fragment) {
            return Some(pid.as_u32());
        }
    }
    None
}

/// Whether a pid is present in the process table
pub fn pid_exists(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
    sys.process(sysinfo::Pid::from_u32(pid)).is_some()
}

/// Kill a pid via the process table (non-Unix fallback path)
pub fn kill_pid(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
    sys.process(sysinfo::Pid::from_u32(pid))
        .map(|p| p.kill())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_pid_no_match() {
        // Nothing plausible is running under this name
        assert_eq!(find_pid("beam-node-test-nonexistent", "--port=65000"), None);
    }

    #[test]
    fn test_current_pid_exists() {
        assert!(pid_exists(std::process::id()));
    }
}
