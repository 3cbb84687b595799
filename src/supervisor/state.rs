//! Durable supervisor state
//!
//! Three single-value pointer files record the state that must survive a
//! supervisor restart: the active wallet name, the node mode, and the node
//! pid. Each is rewritten atomically when the corresponding state change
//! commits and removed when the resource stops. The in-memory value is
//! authoritative at runtime; the files are read once at startup.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DataPaths;
use crate::wallet::Secret;

/// Whether the wallet-api talks to a remote operator-trusted node or the
/// locally supervised node holding the wallet's owner key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    #[default]
    Public,
    Local,
}

impl NodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMode::Public => "public",
            NodeMode::Local => "local",
        }
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(NodeMode::Local),
            "public" => Ok(NodeMode::Public),
            _ => Err(()),
        }
    }
}

/// In-memory wallet session. Secrets live here and nowhere else; `clear`
/// erases them on lock and on supervisor shutdown.
#[derive(Debug, Default)]
pub struct WalletSession {
    pub wallet_name: Option<String>,
    password: Option<Secret>,
    owner_key: Option<Secret>,
}

impl WalletSession {
    pub fn cache_password(&mut self, password: Secret) {
        self.password = Some(password);
    }

    pub fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    pub fn cache_owner_key(&mut self, key: Secret) {
        self.owner_key = Some(key);
    }

    pub fn owner_key(&self) -> Option<&Secret> {
        self.owner_key.as_ref()
    }

    /// Erase all cached secrets and forget the wallet
    pub fn clear(&mut self) {
        if let Some(ref mut p) = self.password {
            p.clear();
        }
        if let Some(ref mut k) = self.owner_key {
            k.clear();
        }
        self.password = None;
        self.owner_key = None;
        self.wallet_name = None;
    }
}

/// Atomically replace a pointer file (write-then-rename)
pub fn write_pointer(path: &Path, value: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, value)?;
    fs::rename(&tmp, path)
}

/// Read a pointer file, trimmed; absent or unreadable is None
pub fn read_pointer(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Remove a pointer file if present
pub fn clear_pointer(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}

/// Load the persisted node mode, defaulting to Public when the file is
/// absent or holds anything unexpected.
pub fn load_mode(paths: &DataPaths) -> NodeMode {
    read_pointer(&paths.node_mode_file())
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Persist a committed node mode
pub fn persist_mode(paths: &DataPaths, mode: NodeMode) {
    if let Err(e) = write_pointer(&paths.node_mode_file(), mode.as_str()) {
        log::error!("Failed to persist node mode '{}': {}", mode, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        assert_eq!(load_mode(&paths), NodeMode::Public);

        persist_mode(&paths, NodeMode::Local);
        assert_eq!(load_mode(&paths), NodeMode::Local);

        persist_mode(&paths, NodeMode::Public);
        assert_eq!(load_mode(&paths), NodeMode::Public);
    }

    #[test]
    fn test_invalid_mode_defaults_to_public() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        fs::write(paths.node_mode_file(), "experimental").unwrap();
        assert_eq!(load_mode(&paths), NodeMode::Public);
    }

    #[test]
    fn test_pointer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pointer = dir.path().join(".active_wallet");

        assert_eq!(read_pointer(&pointer), None);
        write_pointer(&pointer, "main").unwrap();
        assert_eq!(read_pointer(&pointer).as_deref(), Some("main"));

        clear_pointer(&pointer);
        assert_eq!(read_pointer(&pointer), None);
        // Clearing twice is fine
        clear_pointer(&pointer);
    }

    #[test]
    fn test_session_clear_erases_secrets() {
        let mut session = WalletSession {
            wallet_name: Some("main".to_string()),
            ..WalletSession::default()
        };
        session.cache_password(Secret::new("hunter2"));
        session.cache_owner_key(Secret::new("a1b2c3"));

        session.clear();
        assert!(session.password().is_none());
        assert!(session.owner_key().is_none());
        assert!(session.wallet_name.is_none());
    }
}
