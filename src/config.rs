//! Server configuration and data-directory layout
//!
//! Handles loading and saving the supervisor configuration from disk, and
//! resolves the paths of everything the supervisor touches: wallet
//! databases, the BEAM binaries, log files, node storage, and the
//! single-value state pointer files.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supervisor configuration stored in server_config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Port the control API listens on
    pub listen_port: u16,

    /// Port the wallet-api process binds
    pub wallet_api_port: u16,

    /// Port the local beam-node binds
    pub node_port: u16,

    /// Remote node used in public mode when no override is given
    pub default_remote_node: String,

    /// Bootstrap peers passed to the local node
    pub bootstrap_peers: Vec<String>,

    /// "My Tip" height above which the node is assumed caught up.
    /// Heuristic carried from the original deployment; raise it as the
    /// chain grows, or lower it for test networks.
    pub synced_height_floor: u64,

    /// Seconds to wait for wallet-api to answer its first RPC call
    pub wallet_api_start_timeout_secs: u64,

    /// Seconds within which an immediately-crashing node is detected
    pub node_spawn_window_secs: u64,

    /// Fixed warm-up sleep after starting the node, before wallet-api
    /// connects to it
    pub node_warmup_secs: u64,

    /// Grace period between SIGTERM and SIGKILL when stopping the node
    pub node_stop_grace_secs: u64,

    /// Bound on one-shot wallet CLI invocations
    pub cli_timeout_secs: u64,

    /// Bound on the (slower) seed-phrase restore invocation
    pub restore_timeout_secs: u64,

    /// Override for the data directory; supports ~ expansion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            wallet_api_port: 10000,
            node_port: 10005,
            default_remote_node: "eu-node01.mainnet.beam.mw:8100".to_string(),
            bootstrap_peers: vec![
                "eu-node01.mainnet.beam.mw:8100".to_string(),
                "us-node01.mainnet.beam.mw:8100".to_string(),
                "ap-node01.mainnet.beam.mw:8100".to_string(),
            ],
            synced_height_floor: 3_000_000,
            wallet_api_start_timeout_secs: 15,
            node_spawn_window_secs: 3,
            node_warmup_secs: 3,
            node_stop_grace_secs: 2,
            cli_timeout_secs: 30,
            restore_timeout_secs: 60,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Path to the config file, always in the default data directory so the
    /// data-dir override itself can be found.
    pub fn config_path() -> PathBuf {
        DataPaths::default_root().join("server_config.json")
    }

    /// Load config from disk, or return defaults if not found
    pub fn load() -> Self {
        match fs::read_to_string(Self::config_path()) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, contents)?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Local node address as wallet-api expects it
    pub fn local_node_addr(&self) -> String {
        format!("127.0.0.1:{}", self.node_port)
    }

    /// The wallet-api JSON-RPC endpoint
    pub fn wallet_api_url(&self) -> String {
        format!("http://127.0.0.1:{}/api/wallet", self.wallet_api_port)
    }

    pub fn wallet_api_start_timeout(&self) -> Duration {
        Duration::from_secs(self.wallet_api_start_timeout_secs)
    }

    pub fn node_spawn_window(&self) -> Duration {
        Duration::from_secs(self.node_spawn_window_secs)
    }

    pub fn node_warmup(&self) -> Duration {
        Duration::from_secs(self.node_warmup_secs)
    }

    pub fn node_stop_grace(&self) -> Duration {
        Duration::from_secs(self.node_stop_grace_secs)
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_secs(self.cli_timeout_secs)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_secs)
    }
}

/// Executable suffix for the current platform
#[cfg(target_os = "windows")]
const EXE_EXT: &str = ".exe";

#[cfg(not(target_os = "windows"))]
const EXE_EXT: &str = "";

/// Resolved data-directory layout.
///
/// All private data (binaries, wallets, logs, node storage) lives under one
/// root so user data stays in a consistent location regardless of how the
/// server was installed.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub wallets: PathBuf,
    pub binaries: PathBuf,
    pub logs: PathBuf,
    pub node_data: PathBuf,
}

impl DataPaths {
    /// Default root: ~/.beam-light-wallet
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".beam-light-wallet")
    }

    /// Resolve the layout from config (honoring a data-dir override)
    pub fn resolve(config: &ServerConfig) -> Self {
        let root = match &config.data_dir {
            Some(dir) if !dir.is_empty() => PathBuf::from(crate::expand_path(dir)),
            _ => Self::default_root(),
        };
        Self::at(root)
    }

    /// Layout rooted at an explicit directory
    pub fn at(root: PathBuf) -> Self {
        Self {
            wallets: root.join("wallets"),
            binaries: root.join("binaries"),
            logs: root.join("logs"),
            node_data: root.join("node_data"),
            root,
        }
    }

    /// Create every directory in the layout
    pub fn ensure(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(&self.wallets)?;
        fs::create_dir_all(self.binaries.join(Self::platform()))?;
        fs::create_dir_all(&self.logs)?;
        fs::create_dir_all(&self.node_data)?;
        Ok(())
    }

    /// Platform directory name under binaries/
    pub fn platform() -> &'static str {
        #[cfg(target_os = "macos")]
        return "macos";

        #[cfg(target_os = "windows")]
        return "windows";

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        return "linux";
    }

    fn binary(&self, name: &str) -> PathBuf {
        self.binaries
            .join(Self::platform())
            .join(format!("{}{}", name, EXE_EXT))
    }

    /// Path to the beam-wallet CLI binary
    pub fn wallet_cli(&self) -> PathBuf {
        self.binary("beam-wallet")
    }

    /// Path to the wallet-api binary
    pub fn wallet_api_binary(&self) -> PathBuf {
        self.binary("wallet-api")
    }

    /// Path to the beam-node binary
    pub fn node_binary(&self) -> PathBuf {
        self.binary("beam-node")
    }

    /// Directory of a named wallet
    pub fn wallet_dir(&self, name: &str) -> PathBuf {
        self.wallets.join(name)
    }

    /// Database file of a named wallet
    pub fn wallet_db(&self, name: &str) -> PathBuf {
        self.wallet_dir(name).join("wallet.db")
    }

    /// Log file of the wallet-api process for a wallet
    pub fn wallet_api_log(&self, wallet: &str) -> PathBuf {
        self.logs.join(format!("{}_api.log", wallet))
    }

    /// Log file of the local node
    pub fn node_log(&self) -> PathBuf {
        self.logs.join("beam-node.log")
    }

    /// Storage database of the local node
    pub fn node_db(&self) -> PathBuf {
        self.node_data.join("node.db")
    }

    /// Pointer file: name of the wallet the wallet-api is serving
    pub fn active_wallet_file(&self) -> PathBuf {
        self.root.join(".active_wallet")
    }

    /// Pointer file: current node mode (public | local)
    pub fn node_mode_file(&self) -> PathBuf {
        self.root.join(".node_mode")
    }

    /// Pointer file: pid of the supervised node process
    pub fn node_pid_file(&self) -> PathBuf {
        self.root.join(".node.pid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.wallet_api_port, 10000);
        assert_eq!(config.node_port, 10005);
        assert_eq!(config.synced_height_floor, 3_000_000);
        assert_eq!(config.bootstrap_peers.len(), 3);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.node_port, config.node_port);
        assert_eq!(parsed.default_remote_node, config.default_remote_node);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: ServerConfig = serde_json::from_str(r#"{"nodePort": 12005}"#).unwrap();
        assert_eq!(parsed.node_port, 12005);
        assert_eq!(parsed.wallet_api_port, 10000);
    }

    #[test]
    fn test_addresses() {
        let config = ServerConfig::default();
        assert_eq!(config.local_node_addr(), "127.0.0.1:10005");
        assert_eq!(
            config.wallet_api_url(),
            "http://127.0.0.1:10000/api/wallet"
        );
    }

    #[test]
    fn test_paths_layout() {
        let paths = DataPaths::at(PathBuf::from("/tmp/blw"));
        assert_eq!(paths.wallet_db("main"), PathBuf::from("/tmp/blw/wallets/main/wallet.db"));
        assert_eq!(paths.node_log(), PathBuf::from("/tmp/blw/logs/beam-node.log"));
        assert_eq!(paths.node_mode_file(), PathBuf::from("/tmp/blw/.node_mode"));
        assert!(paths
            .node_binary()
            .to_string_lossy()
            .contains("binaries"));
    }
}
