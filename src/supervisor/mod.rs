//! The supervisor
//!
//! One object owns all mutable process and session state - the wallet-api
//! and beam-node handles, the node mode, and the wallet session - behind a
//! single mutex. Every mutating operation serializes on that mutex for its
//! whole duration, so two requests can never race a port bind or a
//! wallet-api restart. Status reads snapshot under a brief lock and do
//! their log scanning outside it.
//!
//! - `state`      - node mode, pointer files, wallet session
//! - `controller` - the mode-switch transitions

pub mod controller;
pub mod state;

use std::sync::Mutex;

use serde::Serialize;

use crate::config::{DataPaths, ServerConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::node::manager as node;
use crate::node::scanner::{self, SyncStatus};
use crate::process::spawn::ManagedProcess;
use crate::wallet::store::CreatedWallet;
use crate::wallet::{api, broker, store, Secret};

pub use state::{NodeMode, WalletSession};

/// Mutable supervisor state guarded by the one big lock
#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) mode: NodeMode,
    pub(crate) session: WalletSession,
    pub(crate) wallet_proc: Option<ManagedProcess>,
    pub(crate) node_proc: Option<ManagedProcess>,
}

/// Combined server/wallet/node status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub status: &'static str,
    pub port: u16,
    pub wallet_api_running: bool,
    pub active_wallet: Option<String>,
    pub wallets_available: Vec<String>,
    pub node_mode: NodeMode,
    pub node_running: bool,
    pub node_synced: bool,
    pub node_progress: u8,
    pub node_height: u64,
    pub version: &'static str,
}

pub struct Supervisor {
    paths: DataPaths,
    config: ServerConfig,
    inner: Mutex<Inner>,
}

impl Supervisor {
    /// Build the supervisor, creating the data layout and loading the
    /// persisted node mode.
    pub fn new(config: ServerConfig) -> std::io::Result<Self> {
        let paths = DataPaths::resolve(&config);
        paths.ensure()?;

        let inner = Inner {
            mode: state::load_mode(&paths),
            ..Inner::default()
        };

        Ok(Self {
            paths,
            config,
            inner: Mutex::new(inner),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Startup reconciliation: adopt processes from a previous supervisor
    /// run and square the persisted mode with reality.
    pub fn reconcile(&self) {
        let mut inner = self.inner.lock().unwrap();

        match api::find_pid(&self.config) {
            Some(pid) => {
                let wallet = state::read_pointer(&self.paths.active_wallet_file());
                log::info!(
                    "Adopted running wallet-api (PID {}, wallet {:?})",
                    pid,
                    wallet
                );
                inner.session.wallet_name = wallet;
            }
            None => {
                state::clear_pointer(&self.paths.active_wallet_file());
            }
        }

        match node::find_pid(&self.config) {
            Some(pid) => {
                log::info!("Adopted running beam-node (PID {})", pid);
                if let Err(e) =
                    state::write_pointer(&self.paths.node_pid_file(), &pid.to_string())
                {
                    log::warn!("Failed to write node pid pointer: {}", e);
                }
            }
            None => {
                state::clear_pointer(&self.paths.node_pid_file());
                // Local mode without a live node is not a valid state
                if inner.mode == NodeMode::Local {
                    log::warn!("Persisted mode was local but no node is running, falling back to public");
                    inner.mode = NodeMode::Public;
                    state::persist_mode(&self.paths, NodeMode::Public);
                }
            }
        }
    }

    // ========================================================================
    // Status (read-only)
    // ========================================================================

    /// Full status snapshot for the control API
    pub fn status(&self) -> ServerStatus {
        let (mode, active_wallet) = {
            let inner = self.inner.lock().unwrap();
            (inner.mode, inner.session.wallet_name.clone())
        };

        let wallet_api_running = api::responding(&self.config);
        let node_status = self.node_status();

        ServerStatus {
            status: "ok",
            port: self.config.listen_port,
            wallet_api_running,
            active_wallet: if wallet_api_running { active_wallet } else { None },
            wallets_available: store::list_wallets(&self.paths),
            node_mode: mode,
            node_running: node_status.running,
            node_synced: node_status.synced,
            node_progress: node_status.progress,
            node_height: node_status.height,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Node sync status, derived from the log tail on each call
    pub fn node_status(&self) -> SyncStatus {
        if !node::is_running(&self.config) {
            return SyncStatus::offline();
        }
        scanner::scan_log(&self.paths.node_log(), self.config.synced_height_floor)
    }

    /// Available wallets and the active one
    pub fn wallets(&self) -> (Vec<String>, Option<String>) {
        let active = self.inner.lock().unwrap().session.wallet_name.clone();
        (store::list_wallets(&self.paths), active)
    }

    // ========================================================================
    // Session operations
    // ========================================================================

    /// Unlock a wallet: start the wallet-api serving it. In local mode with
    /// no explicit node override this goes through the full switch so the
    /// node gets the wallet's owner key.
    pub fn unlock(
        &self,
        wallet_name: &str,
        password: Secret,
        node_override: Option<&str>,
    ) -> SupervisorResult<()> {
        store::validate_wallet_name(wallet_name)?;
        let mut inner = self.inner.lock().unwrap();

        if inner.mode == NodeMode::Local && node_override.is_none() {
            log::info!("Unlock in local mode, using full switch for '{}'", wallet_name);
            return controller::switch_to_local(
                &self.paths,
                &self.config,
                &mut inner,
                wallet_name,
                &password,
            );
        }

        let node_addr = node_override.unwrap_or(&self.config.default_remote_node);
        let proc = api::start(&self.paths, &self.config, wallet_name, &password, node_addr)?;
        inner.wallet_proc = Some(proc);
        if let Err(e) = state::write_pointer(&self.paths.active_wallet_file(), wallet_name) {
            log::warn!("Failed to write active wallet pointer: {}", e);
        }
        inner.session.wallet_name = Some(wallet_name.to_string());
        inner.session.cache_password(password);
        Ok(())
    }

    /// Lock the wallet: stop both processes and erase cached secrets
    pub fn lock(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.stop_all(&mut inner);
        inner.session.clear();
        log::info!("Wallet locked");
    }

    /// Stop stale processes without touching the session (fresh-start
    /// recovery for a confused client)
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.stop_all(&mut inner);
        inner.session.wallet_name = None;
    }

    /// Stop everything and erase secrets; used at server exit
    pub fn shutdown(&self) {
        log::info!("Shutdown: stopping all services");
        let mut inner = self.inner.lock().unwrap();
        self.stop_all(&mut inner);
        inner.session.clear();
        log::info!("Shutdown: all services stopped");
    }

    fn stop_all(&self, inner: &mut Inner) {
        api::stop(&self.paths, &self.config);
        if let Some(mut proc) = inner.wallet_proc.take() {
            proc.reap();
        }
        node::stop(&self.paths, &self.config);
        if let Some(mut proc) = inner.node_proc.take() {
            proc.reap();
        }
    }

    // ========================================================================
    // Wallet store operations
    // ========================================================================

    pub fn create_wallet(&self, name: &str, password: &Secret) -> SupervisorResult<CreatedWallet> {
        let _guard = self.inner.lock().unwrap();
        store::create_wallet(&self.paths, &self.config, name, password)
    }

    pub fn restore_wallet(
        &self,
        name: &str,
        password: &Secret,
        seed_phrase: &str,
    ) -> SupervisorResult<()> {
        let _guard = self.inner.lock().unwrap();
        store::restore_wallet(&self.paths, &self.config, name, password, seed_phrase)
    }

    pub fn delete_wallet(&self, name: &str) -> SupervisorResult<()> {
        let inner = self.inner.lock().unwrap();
        store::delete_wallet(&self.paths, name, inner.session.wallet_name.as_deref())
    }

    /// Export the owner key of a wallet, caching it (and the password) in
    /// the session on success.
    pub fn export_owner_key(
        &self,
        wallet_name: &str,
        password: Secret,
    ) -> SupervisorResult<String> {
        let mut inner = self.inner.lock().unwrap();
        let key = broker::export_owner_key(&self.paths, &self.config, wallet_name, &password)?;
        if let Some(mut stale) = inner.wallet_proc.take() {
            stale.reap();
        }
        let exposed = key.expose().to_string();
        inner.session.cache_password(password);
        inner.session.cache_owner_key(key);
        Ok(exposed)
    }

    // ========================================================================
    // Node operations
    // ========================================================================

    /// Start the local node directly (optionally key-aware)
    pub fn start_node(
        &self,
        owner_key: Option<Secret>,
        password: Option<Secret>,
    ) -> SupervisorResult<u32> {
        let mut inner = self.inner.lock().unwrap();
        let proc = node::start(
            &self.paths,
            &self.config,
            owner_key.as_ref(),
            password.as_ref(),
        )?;
        let pid = proc.pid;
        if let Err(e) = state::write_pointer(&self.paths.node_pid_file(), &pid.to_string()) {
            log::warn!("Failed to write node pid pointer: {}", e);
        }
        inner.node_proc = Some(proc);
        Ok(pid)
    }

    /// Stop the local node
    pub fn stop_node(&self) {
        let mut inner = self.inner.lock().unwrap();
        node::stop(&self.paths, &self.config);
        if let Some(mut proc) = inner.node_proc.take() {
            proc.reap();
        }
    }

    /// Switch between public and local mode.
    ///
    /// Picks the fast path (wallet-api restart only) when it is available:
    /// always for public, and for local when a node is already running.
    /// Otherwise falls back to the full switch.
    pub fn switch(
        &self,
        mode: NodeMode,
        password: Option<Secret>,
        wallet_name: Option<&str>,
        node_override: Option<&str>,
    ) -> SupervisorResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(pw) = password {
            inner.session.cache_password(pw);
        }
        if inner.session.password().is_none() {
            return Err(SupervisorError::WalletOperation(
                "No password available. Re-unlock wallet.".to_string(),
            ));
        }

        match mode {
            NodeMode::Public => controller::fast_switch(
                &self.paths,
                &self.config,
                &mut inner,
                NodeMode::Public,
                node_override,
            ),
            NodeMode::Local if node::is_running(&self.config) => controller::fast_switch(
                &self.paths,
                &self.config,
                &mut inner,
                NodeMode::Local,
                None,
            ),
            NodeMode::Local => {
                let wallet = wallet_name
                    .map(str::to_string)
                    .or_else(|| inner.session.wallet_name.clone())
                    .ok_or_else(|| {
                        SupervisorError::WalletOperation(
                            "No wallet specified and no active wallet".to_string(),
                        )
                    })?;
                let password = inner
                    .session
                    .password()
                    .cloned()
                    .expect("password checked above");
                controller::switch_to_local(
                    &self.paths,
                    &self.config,
                    &mut inner,
                    &wallet,
                    &password,
                )
            }
        }
    }

    /// Rescan a wallet against a key-aware local node. Returns whether the
    /// rescan is actually running (false means the degraded keyless
    /// fallback was taken).
    pub fn rescan(&self, wallet_name: Option<&str>, password: Secret) -> SupervisorResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = wallet_name
            .map(str::to_string)
            .or_else(|| inner.session.wallet_name.clone())
            .ok_or_else(|| {
                SupervisorError::WalletOperation(
                    "No wallet specified and no active wallet".to_string(),
                )
            })?;
        controller::rescan(&self.paths, &self.config, &mut inner, &wallet, &password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_supervisor() -> (tempfile::TempDir, Supervisor) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            wallet_api_port: 59741,
            node_port: 59742,
            data_dir: Some(dir.path().to_string_lossy().to_string()),
            ..ServerConfig::default()
        };
        let supervisor = Supervisor::new(config).unwrap();
        (dir, supervisor)
    }

    #[test]
    fn test_new_defaults_to_public() {
        let (_dir, supervisor) = test_supervisor();
        let status = supervisor.status();
        assert_eq!(status.node_mode, NodeMode::Public);
        assert!(!status.node_running);
        assert!(status.wallets_available.is_empty());
        assert_eq!(status.active_wallet, None);
    }

    #[test]
    fn test_reconcile_demotes_stale_local_mode() {
        let (_dir, supervisor) = test_supervisor();

        // Pretend a previous run committed local mode, then died along
        // with its node
        state::persist_mode(&supervisor.paths, NodeMode::Local);
        state::write_pointer(&supervisor.paths.node_pid_file(), "999999").unwrap();
        supervisor.inner.lock().unwrap().mode = NodeMode::Local;

        supervisor.reconcile();

        assert_eq!(supervisor.inner.lock().unwrap().mode, NodeMode::Public);
        assert_eq!(state::load_mode(&supervisor.paths), NodeMode::Public);
        assert!(!supervisor.paths.node_pid_file().exists());
    }

    #[test]
    fn test_node_status_offline_without_node() {
        let (_dir, supervisor) = test_supervisor();
        assert_eq!(supervisor.node_status(), SyncStatus::offline());
    }

    #[test]
    fn test_switch_requires_password() {
        let (_dir, supervisor) = test_supervisor();
        let err = supervisor
            .switch(NodeMode::Public, None, None, None)
            .unwrap_err();
        assert!(matches!(err, SupervisorError::WalletOperation(_)));
    }

    #[test]
    fn test_rescan_requires_wallet() {
        let (_dir, supervisor) = test_supervisor();
        let err = supervisor.rescan(None, Secret::new("pw")).unwrap_err();
        assert!(err.to_string().contains("No wallet specified"));
    }

    #[test]
    fn test_lock_clears_session() {
        let (_dir, supervisor) = test_supervisor();
        {
            let mut inner = supervisor.inner.lock().unwrap();
            inner.session.wallet_name = Some("main".to_string());
            inner.session.cache_password(Secret::new("pw"));
        }
        supervisor.lock();
        let inner = supervisor.inner.lock().unwrap();
        assert!(inner.session.wallet_name.is_none());
        assert!(inner.session.password().is_none());
    }
}
