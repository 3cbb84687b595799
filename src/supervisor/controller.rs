//! Node-mode transitions
//!
//! The three ways the supervisor moves between public and local mode:
//!
//! - `switch_to_local` - the full path: export the owner key, restart the
//!   node with it, reconnect the wallet-api
//! - `fast_switch`     - restart only the wallet-api against a node that
//!   already exists, using the cached session password
//! - `rescan`          - force-restart the node with the owner key so it
//!   reprocesses chain data for a restored wallet
//!
//! A transition either commits (mode updated and persisted) or leaves the
//! mode untouched and surfaces the failing step. Local mode is only ever
//! committed while the node process is verified alive.

use std::time::Duration;

use crate::config::{DataPaths, ServerConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::node::manager as node;
use crate::supervisor::state::{self, NodeMode};
use crate::supervisor::Inner;
use crate::wallet::{api, broker, Secret};

/// Full switch to the local node (used when no node is running yet).
pub(crate) fn switch_to_local(
    paths: &DataPaths,
    config: &ServerConfig,
    inner: &mut Inner,
    wallet_name: &str,
    password: &Secret,
) -> SupervisorResult<()> {
    log::info!("Switching '{}' to local node", wallet_name);

    // Step 1: export the owner key (stops/restarts wallet-api internally)
    let owner_key = broker::export_owner_key(paths, config, wallet_name, password)
        .map_err(|e| e.during("export_owner_key"))?;
    if let Some(mut stale) = inner.wallet_proc.take() {
        stale.reap();
    }

    // Step 2: stop any existing node and free its port
    node::stop(paths, config);
    if let Some(mut stale) = inner.node_proc.take() {
        stale.reap();
    }
    std::thread::sleep(Duration::from_secs(1));

    // Step 3: start the node with the key; step 4: one keyless retry.
    // Without the key the node still serves chain data, just not balances.
    let (node_proc, key_injected) =
        match node::start(paths, config, Some(&owner_key), Some(password)) {
            Ok(proc) => (proc, true),
            Err(first) => {
                log::warn!(
                    "Node start with owner key failed ({}), retrying without key",
                    first
                );
                match node::start(paths, config, None, None) {
                    Ok(proc) => (proc, false),
                    Err(retry) => return Err(retry.during("start_node")),
                }
            }
        };
    if let Err(e) = state::write_pointer(&paths.node_pid_file(), &node_proc.pid.to_string()) {
        log::warn!("Failed to write node pid pointer: {}", e);
    }
    inner.node_proc = Some(node_proc);

    // Step 5: fixed warm-up; the node's real readiness signal is the
    // wallet-api connection attempt that follows.
    std::thread::sleep(config.node_warmup());

    // Step 6: point the wallet-api at the local node
    let wallet_proc = api::start(
        paths,
        config,
        wallet_name,
        password,
        &config.local_node_addr(),
    )
    .map_err(|e| e.during("start_wallet_api"))?;
    inner.wallet_proc = Some(wallet_proc);
    if let Err(e) = state::write_pointer(&paths.active_wallet_file(), wallet_name) {
        log::warn!("Failed to write active wallet pointer: {}", e);
    }

    // Step 7: commit. Local mode requires a verified-alive node.
    if !node::is_running(config) {
        return Err(
            SupervisorError::ResourceBusy("local node is not running".to_string())
                .during("commit_mode"),
        );
    }
    inner.mode = NodeMode::Local;
    state::persist_mode(paths, NodeMode::Local);

    inner.session.wallet_name = Some(wallet_name.to_string());
    inner.session.cache_password(password.clone());
    if key_injected {
        inner.session.cache_owner_key(owner_key);
    }

    log::info!("Switched to local node");
    Ok(())
}

/// Fast switch: restart only the wallet-api against the chosen node,
/// using the cached session password. For local mode the node must
/// already be alive - this path exists to avoid the expensive full switch
/// and never auto-starts a node.
pub(crate) fn fast_switch(
    paths: &DataPaths,
    config: &ServerConfig,
    inner: &mut Inner,
    mode: NodeMode,
    node_override: Option<&str>,
) -> SupervisorResult<()> {
    let wallet_name = inner
        .session
        .wallet_name
        .clone()
        .ok_or_else(|| SupervisorError::WalletOperation("No active wallet".to_string()))?;
    let password = inner
        .session
        .password()
        .cloned()
        .ok_or_else(|| {
            SupervisorError::WalletOperation("No stored password. Re-unlock wallet.".to_string())
        })?;

    let target_node = match mode {
        NodeMode::Local => {
            if !node::is_running(config) {
                return Err(SupervisorError::ResourceBusy(
                    "local node is not running".to_string(),
                ));
            }
            config.local_node_addr()
        }
        NodeMode::Public => node_override
            .unwrap_or(&config.default_remote_node)
            .to_string(),
    };

    log::info!("Fast switch to {} mode via {}", mode, target_node);

    let wallet_proc = api::start(paths, config, &wallet_name, &password, &target_node)
        .map_err(|e| e.during("start_wallet_api"))?;
    inner.wallet_proc = Some(wallet_proc);
    if let Err(e) = state::write_pointer(&paths.active_wallet_file(), &wallet_name) {
        log::warn!("Failed to write active wallet pointer: {}", e);
    }

    if mode == NodeMode::Local && !node::is_running(config) {
        return Err(
            SupervisorError::ResourceBusy("local node is not running".to_string())
                .during("commit_mode"),
        );
    }
    inner.mode = mode;
    state::persist_mode(paths, mode);
    Ok(())
}

/// Rescan: restart the node with the owner key even if one is already
/// running, so a restored wallet's balances get re-derived. If the node
/// cannot be started, degrade to plain local connectivity instead of
/// aborting - the wallet stays usable, only the rescan is lost.
///
/// Returns whether a key-aware node is running (i.e. whether the rescan is
/// actually in progress).
pub(crate) fn rescan(
    paths: &DataPaths,
    config: &ServerConfig,
    inner: &mut Inner,
    wallet_name: &str,
    password: &Secret,
) -> SupervisorResult<bool> {
    log::info!("Rescanning wallet '{}'", wallet_name);

    let owner_key = broker::export_owner_key(paths, config, wallet_name, password)
        .map_err(|e| e.during("export_owner_key"))?;
    if let Some(mut stale) = inner.wallet_proc.take() {
        stale.reap();
    }

    // A rescan needs the node freshly pointed at the key, so an existing
    // node is restarted unconditionally.
    node::stop(paths, config);
    if let Some(mut stale) = inner.node_proc.take() {
        stale.reap();
    }
    std::thread::sleep(Duration::from_secs(1));

    let node_started = match node::start(paths, config, Some(&owner_key), Some(password)) {
        Ok(proc) => {
            if let Err(e) = state::write_pointer(&paths.node_pid_file(), &proc.pid.to_string()) {
                log::warn!("Failed to write node pid pointer: {}", e);
            }
            inner.node_proc = Some(proc);
            true
        }
        Err(e) => {
            log::warn!(
                "Could not start node for rescan ({}), connecting without rescan",
                e
            );
            false
        }
    };

    if node_started {
        std::thread::sleep(config.node_warmup());
    }

    let wallet_proc = api::start(
        paths,
        config,
        wallet_name,
        password,
        &config.local_node_addr(),
    )
    .map_err(|e| e.during("start_wallet_api"))?;
    inner.wallet_proc = Some(wallet_proc);
    if let Err(e) = state::write_pointer(&paths.active_wallet_file(), wallet_name) {
        log::warn!("Failed to write active wallet pointer: {}", e);
    }

    inner.session.wallet_name = Some(wallet_name.to_string());
    inner.session.cache_password(password.clone());

    if node_started && node::is_running(config) {
        inner.mode = NodeMode::Local;
        state::persist_mode(paths, NodeMode::Local);
        inner.session.cache_owner_key(owner_key);
        Ok(true)
    } else {
        // Degraded: connectivity without rescan capability; the mode is
        // not committed to local without a live node.
        Ok(false)
    }
}
