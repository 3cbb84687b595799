//! wallet-api process lifecycle
//!
//! Starts and stops the wallet-serving process and verifies readiness by
//! probing its JSON-RPC endpoint. The process binds a fixed local port and
//! holds an exclusive lock on the active wallet's database while running.

use std::time::Duration;

use crate::config::{DataPaths, ServerConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::process::spawn::{self, ManagedProcess, ProcessKind, SpawnSpec};
use crate::process::{health, port, table};
use crate::wallet::Secret;

/// Find the supervised wallet-api pid, if one is running
pub fn find_pid(config: &ServerConfig) -> Option<u32> {
    table::find_pid("wallet-api", &format!("--port={}", config.wallet_api_port))
}

/// Whether the wallet-api answers a `wallet_status` RPC call.
///
/// Any well-formed HTTP 200 counts as healthy; the supervisor does not
/// interpret the response body.
pub fn responding(config: &ServerConfig) -> bool {
    let url = config.wallet_api_url();

    // The supervisor is synchronous; run the async probe on its own
    // runtime in a scratch thread.
    let probe = std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().ok()?;
        Some(rt.block_on(probe_status(&url)))
    })
    .join();

    matches!(probe, Ok(Some(true)))
}

async fn probe_status(url: &str) -> bool {
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return false;
    };

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "wallet_status",
    });

    match client.post(url).json(&body).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Stop the wallet-api process and release its port.
///
/// The wallet-api keeps no state between requests, so it is killed
/// outright rather than drained.
pub fn stop(paths: &DataPaths, config: &ServerConfig) {
    if let Some(pid) = find_pid(config) {
        log::info!("Stopping wallet-api (PID {})", pid);
        spawn::send_kill(pid);
        std::thread::sleep(Duration::from_millis(200));
    }

    if let Err(e) = port::reclaim(config.wallet_api_port) {
        log::warn!("wallet-api port reclaim: {}", e);
    }

    let pointer = paths.active_wallet_file();
    if pointer.exists() {
        let _ = std::fs::remove_file(&pointer);
    }
}

/// Start wallet-api for a wallet, pointed at `node_addr`, and wait until
/// it answers RPC calls.
pub fn start(
    paths: &DataPaths,
    config: &ServerConfig,
    wallet_name: &str,
    password: &Secret,
    node_addr: &str,
) -> SupervisorResult<ManagedProcess> {
    let wallet_db = paths.wallet_db(wallet_name);
    if !wallet_db.exists() {
        return Err(SupervisorError::WalletNotFound(wallet_name.to_string()));
    }

    // One wallet-api at a time; clear out any predecessor first
    stop(paths, config);
    std::thread::sleep(Duration::from_secs(1));

    let log_path = paths.wallet_api_log(wallet_name);
    let args = vec![
        format!("--wallet_path={}", wallet_db.display()),
        format!("--pass={}", password.expose()),
        format!("--node_addr={}", node_addr),
        format!("--port={}", config.wallet_api_port),
        "--use_http=1".to_string(),
        "--enable_assets".to_string(),
        "--enable_lelantus".to_string(),
    ];

    let process = spawn::spawn(SpawnSpec {
        kind: ProcessKind::Wallet,
        binary: paths.wallet_api_binary(),
        args,
        log_path: log_path.clone(),
        cwd: paths.root.clone(),
        bound_port: config.wallet_api_port,
    })?;

    let ready = health::wait_for(
        || responding(config),
        Duration::from_secs(1),
        config.wallet_api_start_timeout(),
    );

    if ready {
        log::info!("wallet-api serving '{}' via {}", wallet_name, node_addr);
        return Ok(process);
    }

    Err(classify_start_failure(&spawn::read_log_tail(
        &log_path,
        64 * 1024,
    )))
}

/// Map the wallet-api log tail to the most specific failure we can name
pub(crate) fn classify_start_failure(log_text: &str) -> SupervisorError {
    let lowered = log_text.to_lowercase();
    if lowered.contains("file is not a database") || lowered.contains("invalid password") {
        return SupervisorError::InvalidCredential;
    }
    if let Some(idx) = log_text.find("EXCEPTION") {
        let detail = log_text[idx..]
            .trim_start_matches("EXCEPTION")
            .trim_start_matches(':')
            .trim();
        let truncated: String = detail.chars().take(100).collect();
        return SupervisorError::WalletOperation(truncated);
    }
    SupervisorError::Timeout("wallet-api readiness")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_invalid_password() {
        let err = classify_start_failure("I 2026-02-11 Loading... \nFile is not a database\n");
        assert!(matches!(err, SupervisorError::InvalidCredential));

        let err = classify_start_failure("error: Invalid password provided");
        assert!(matches!(err, SupervisorError::InvalidCredential));
    }

    #[test]
    fn test_classify_exception() {
        let err = classify_start_failure("startup\nEXCEPTION: address already in use\n");
        match err {
            SupervisorError::WalletOperation(msg) => {
                assert!(msg.starts_with("address already in use"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_classify_plain_timeout() {
        let err = classify_start_failure("I 2026-02-11 still syncing...");
        assert!(matches!(
            err,
            SupervisorError::Timeout("wallet-api readiness")
        ));
    }

    #[test]
    fn test_start_unknown_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let paths = crate::config::DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        let err = start(
            &paths,
            &ServerConfig::default(),
            "ghost",
            &Secret::new("pw"),
            "127.0.0.1:10005",
        )
        .unwrap_err();
        assert!(matches!(err, SupervisorError::WalletNotFound(_)));
    }
}
