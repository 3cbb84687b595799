//! beam-node process lifecycle
//!
//! Starts the local node with fast sync against the bootstrap peers,
//! optionally carrying the wallet's owner viewing key, and stops it with a
//! graceful-then-forceful escalation. The node owns the chain database
//! under `node_data/` while running.

use std::time::Duration;

use crate::config::{DataPaths, ServerConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::process::spawn::{self, ManagedProcess, ProcessKind, SpawnSpec};
use crate::process::{health, port, table};
use crate::wallet::Secret;

/// Find the supervised beam-node pid, if one is running
pub fn find_pid(config: &ServerConfig) -> Option<u32> {
    table::find_pid("beam-node", &format!("--port={}", config.node_port))
}

/// Whether the local node is running
pub fn is_running(config: &ServerConfig) -> bool {
    find_pid(config).is_some()
}

/// Stop the local node and release its port and pid pointer
pub fn stop(paths: &DataPaths, config: &ServerConfig) {
    if let Some(pid) = find_pid(config) {
        log::info!("Stopping beam-node (PID {})", pid);
        if !spawn::terminate_pid(pid, config.node_stop_grace()) {
            log::warn!("beam-node PID {} did not exit cleanly", pid);
        }
    }

    if let Err(e) = port::reclaim(config.node_port) {
        log::warn!("node port reclaim: {}", e);
    }

    let pid_file = paths.node_pid_file();
    if pid_file.exists() {
        let _ = std::fs::remove_file(&pid_file);
    }
}

/// Start the local node with fast sync.
///
/// The owner key (with its password) makes the node recognize the wallet's
/// outputs; without it the node still serves chain data. Any existing node
/// is fully stopped first so at most one instance holds the storage.
pub fn start(
    paths: &DataPaths,
    config: &ServerConfig,
    owner_key: Option<&Secret>,
    password: Option<&Secret>,
) -> SupervisorResult<ManagedProcess> {
    let binary = paths.node_binary();
    spawn::ensure_executable(&binary)?;

    stop(paths, config);
    port::reclaim(config.node_port)?;
    // Give the kernel a moment to finish releasing the port
    std::thread::sleep(Duration::from_secs(1));

    std::fs::create_dir_all(&paths.logs)?;
    std::fs::create_dir_all(&paths.node_data)?;

    let mut args = vec![
        format!("--port={}", config.node_port),
        format!("--storage={}", paths.node_db().display()),
        "--log_level=info".to_string(),
        "--fast_sync=1".to_string(),
    ];
    for peer in &config.bootstrap_peers {
        args.push(format!("--peer={}", peer));
    }
    if let Some(key) = owner_key {
        args.push(format!("--owner_key={}", key.expose()));
        // The node needs the wallet password to use the key
        if let Some(pass) = password {
            args.push(format!("--pass={}", pass.expose()));
        }
    }

    let mut process = spawn::spawn(SpawnSpec {
        kind: ProcessKind::Node,
        binary: binary.clone(),
        args,
        log_path: paths.node_log(),
        cwd: paths.node_data.clone(),
        bound_port: config.node_port,
    })?;

    // Watch the spawn window: either the node shows up in the process
    // table, or it exited and we can say why.
    let deadline = std::time::Instant::now() + config.node_spawn_window();
    loop {
        if let Some(code) = process.try_exit_code() {
            let tail = spawn::read_log_tail(&paths.node_log(), 2048);
            let snippet = tail_snippet(&tail, 500);
            return Err(SupervisorError::ProcessCrashed(spawn::describe_exit(
                code, &binary, snippet,
            )));
        }
        if is_running(config) {
            break;
        }
        if std::time::Instant::now() >= deadline {
            // Spawned but never showed up under the expected signature
            if !health::wait_for(
                || is_running(config),
                Duration::from_millis(200),
                Duration::from_secs(1),
            ) {
                return Err(SupervisorError::Timeout("node process liveness"));
            }
            break;
        }
        std::thread::sleep(Duration::from_millis(300));
    }

    log::info!("beam-node running (PID {})", process.pid);
    Ok(process)
}

/// Last `chars` characters of a log excerpt, trimmed
fn tail_snippet(text: &str, chars: usize) -> &str {
    let count = text.chars().count();
    if count <= chars {
        return text.trim();
    }
    let skip = count - chars;
    let (idx, _) = text.char_indices().nth(skip).unwrap_or((0, ' '));
    text[idx..].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_without_binary_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        let err = start(&paths, &ServerConfig::default(), None, None).unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_is_running_false_without_node() {
        // No beam-node bound to this port in the test environment
        let config = ServerConfig {
            node_port: 59899,
            ..ServerConfig::default()
        };
        assert!(!is_running(&config));
        assert_eq!(find_pid(&config), None);
    }

    #[test]
    fn test_tail_snippet() {
        assert_eq!(tail_snippet("short", 10), "short");
        assert_eq!(tail_snippet("abcdefghij", 4), "ghij");
    }
}
