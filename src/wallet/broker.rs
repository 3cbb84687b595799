//! Owner-key export
//!
//! The owner viewing key lets a local node recognize the wallet's on-chain
//! outputs without gaining spending capability. Exporting it uses the
//! beam-wallet CLI against the wallet database - which the wallet-api holds
//! an exclusive lock on while running. The export therefore stops the
//! wallet-api first and always restarts it afterwards: the export is a side
//! operation and must not leave the primary session down.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::config::{DataPaths, ServerConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::process::spawn::run_cli;
use crate::wallet::{api, Secret};

/// Export the owner viewing key of a wallet.
///
/// If the wallet-api was running it is brought back up for the same wallet
/// afterwards, whether or not the export succeeded.
pub fn export_owner_key(
    paths: &DataPaths,
    config: &ServerConfig,
    wallet_name: &str,
    password: &Secret,
) -> SupervisorResult<Secret> {
    let wallet_db = paths.wallet_db(wallet_name);
    if !wallet_db.exists() {
        return Err(SupervisorError::WalletNotFound(wallet_name.to_string()));
    }

    // Release the wallet.db lock for the CLI
    let was_running = api::find_pid(config).is_some();
    if was_running {
        log::info!("Stopping wallet-api for owner-key export (database lock handoff)");
        api::stop(paths, config);
        std::thread::sleep(Duration::from_secs(1));
    }

    let args = vec![
        "export_owner_key".to_string(),
        format!("--wallet_path={}", wallet_db.display()),
        format!("--pass={}", password.expose()),
    ];

    let result = run_export(paths, config, &args);

    if was_running {
        log::info!("Restarting wallet-api after owner-key export");
        if let Err(e) = api::start(paths, config, wallet_name, password, &config.default_remote_node)
        {
            log::warn!("Failed to restart wallet-api after export: {}", e);
        }
    }

    result
}

fn run_export(
    paths: &DataPaths,
    config: &ServerConfig,
    args: &[String],
) -> SupervisorResult<Secret> {
    let output = run_cli(
        &paths.wallet_cli(),
        args,
        config.cli_timeout(),
        "owner-key export",
    )?;

    if let Some(key) = parse_owner_key(&output.text) {
        let secret = Secret::new(key);
        log::info!("Owner key exported: {}", secret.preview());
        return Ok(secret);
    }

    if is_invalid_password(&output.text) {
        return Err(SupervisorError::InvalidCredential);
    }

    let truncated: String = output.text.chars().take(500).collect();
    Err(SupervisorError::Extraction(truncated))
}

/// Pull the owner key out of combined CLI output.
///
/// Labeled forms are tried first; if no label matches, fall back to the
/// longest hex-looking token, preferring tokens that decode as real hex.
pub(crate) fn parse_owner_key(output: &str) -> Option<String> {
    static LABELED: OnceLock<Vec<Regex>> = OnceLock::new();
    static HEX_TOKEN: OnceLock<Regex> = OnceLock::new();

    let labeled = LABELED.get_or_init(|| {
        vec![
            Regex::new(r"(?i)Owner Viewer key[:\s]+(\S+)").unwrap(),
            Regex::new(r"(?i)owner_key[:\s]+(\S+)").unwrap(),
        ]
    });
    for re in labeled {
        if let Some(caps) = re.captures(output) {
            return Some(caps.get(1)?.as_str().to_string());
        }
    }

    let hex_re = HEX_TOKEN.get_or_init(|| Regex::new(r"[a-fA-F0-9]{64,}").unwrap());
    let mut candidates: Vec<&str> = hex_re.find_iter(output).map(|m| m.as_str()).collect();
    candidates.sort_by_key(|t| std::cmp::Reverse(t.len()));

    candidates
        .iter()
        .find(|t| hex::decode(t).is_ok())
        .or_else(|| candidates.first())
        .map(|t| t.to_string())
}

pub(crate) fn is_invalid_password(output: &str) -> bool {
    let lowered = output.to_lowercase();
    lowered.contains("invalid password") || lowered.contains("file is not a database")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labeled_key() {
        let output = "Loading wallet...\nOwner Viewer key: a1b2c3d4e5f6\nDone";
        assert_eq!(parse_owner_key(output).as_deref(), Some("a1b2c3d4e5f6"));

        let output = "owner_key: ffee0011";
        assert_eq!(parse_owner_key(output).as_deref(), Some("ffee0011"));
    }

    #[test]
    fn test_parse_hex_fallback_prefers_longest() {
        let short = "ab".repeat(32); // 64 chars
        let long = "cd".repeat(48); // 96 chars
        let output = format!("noise {} more noise {} end", short, long);
        assert_eq!(parse_owner_key(&output).as_deref(), Some(long.as_str()));
    }

    #[test]
    fn test_parse_hex_fallback_requires_min_length() {
        assert_eq!(parse_owner_key("just abcdef0123456789 here"), None);
    }

    #[test]
    fn test_labeled_form_wins_over_hex() {
        let hex = "ef".repeat(40);
        let output = format!("{}\nOwner Viewer key: labeledkey123", hex);
        assert_eq!(parse_owner_key(&output).as_deref(), Some("labeledkey123"));
    }

    #[test]
    fn test_invalid_password_detection() {
        assert!(is_invalid_password("Error: Invalid Password supplied"));
        assert!(is_invalid_password("File is not a database"));
        assert!(!is_invalid_password("everything is fine"));
    }

    #[test]
    fn test_export_unknown_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let paths = crate::config::DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        let err = export_owner_key(
            &paths,
            &ServerConfig::default(),
            "ghost",
            &Secret::new("pw"),
        )
        .unwrap_err();
        assert!(matches!(err, SupervisorError::WalletNotFound(_)));
    }
}
