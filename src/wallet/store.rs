//! Wallet store operations via the beam-wallet CLI
//!
//! Creating, restoring, deleting and listing wallet databases. Each wallet
//! lives in its own directory under `wallets/` and is identified by the
//! presence of a `wallet.db` file.

use std::fs;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{DataPaths, ServerConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::process::spawn::run_cli;
use crate::wallet::Secret;

/// Result of creating a new wallet
#[derive(Debug)]
pub struct CreatedWallet {
    pub name: String,
    /// The generated 12-word seed phrase, if it could be read from the CLI
    /// output. The caller must show it to the user exactly once.
    pub seed_phrase: Option<String>,
}

/// List wallet directories that contain a wallet.db, sorted by name
pub fn list_wallets(paths: &DataPaths) -> Vec<String> {
    let mut wallets = Vec::new();
    if let Ok(entries) = fs::read_dir(&paths.wallets) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.join("wallet.db").exists() {
                if let Some(name) = path.file_name() {
                    wallets.push(name.to_string_lossy().to_string());
                }
            }
        }
    }
    wallets.sort();
    wallets
}

/// Wallet names are path components; restrict them accordingly
pub fn validate_wallet_name(name: &str) -> SupervisorResult<()> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());
    if re.is_match(name) {
        Ok(())
    } else {
        Err(SupervisorError::WalletOperation(
            "Invalid wallet name. Use only letters, numbers, underscore, hyphen.".to_string(),
        ))
    }
}

/// Create a new wallet with `beam-wallet init`
pub fn create_wallet(
    paths: &DataPaths,
    config: &ServerConfig,
    name: &str,
    password: &Secret,
) -> SupervisorResult<CreatedWallet> {
    validate_wallet_name(name)?;

    let wallet_dir = paths.wallet_dir(name);
    if wallet_dir.exists() {
        return Err(SupervisorError::WalletExists(name.to_string()));
    }
    fs::create_dir_all(&wallet_dir)?;

    let wallet_db = paths.wallet_db(name);
    let args = vec![
        "init".to_string(),
        format!("--wallet_path={}", wallet_db.display()),
        format!("--pass={}", password.expose()),
    ];

    let result = run_cli(
        &paths.wallet_cli(),
        &args,
        config.cli_timeout(),
        "wallet creation",
    );

    let output = match result {
        Ok(out) => out,
        Err(e) => {
            let _ = fs::remove_dir_all(&wallet_dir);
            return Err(e);
        }
    };

    if !wallet_db.exists() {
        let _ = fs::remove_dir_all(&wallet_dir);
        return Err(SupervisorError::WalletOperation(format!(
            "Wallet creation failed: {}",
            truncate(&output.text, 200)
        )));
    }

    let seed_phrase = extract_seed_phrase(&output.text);
    if seed_phrase.is_none() {
        log::warn!("Wallet '{}' created but no seed phrase found in CLI output", name);
    }

    Ok(CreatedWallet {
        name: name.to_string(),
        seed_phrase,
    })
}

/// Restore a wallet from a 12-word seed phrase with `beam-wallet restore`
pub fn restore_wallet(
    paths: &DataPaths,
    config: &ServerConfig,
    name: &str,
    password: &Secret,
    seed_phrase: &str,
) -> SupervisorResult<()> {
    validate_wallet_name(name)?;

    let words: Vec<&str> = seed_phrase.split_whitespace().collect();
    if words.len() != 12 {
        return Err(SupervisorError::WalletOperation(
            "Seed phrase must be exactly 12 words".to_string(),
        ));
    }

    let wallet_dir = paths.wallet_dir(name);
    if wallet_dir.exists() {
        return Err(SupervisorError::WalletExists(name.to_string()));
    }
    fs::create_dir_all(&wallet_dir)?;

    let wallet_db = paths.wallet_db(name);
    let args = vec![
        "restore".to_string(),
        format!("--wallet_path={}", wallet_db.display()),
        format!("--pass={}", password.expose()),
        format!("--seed_phrase={}", format_seed_phrase(seed_phrase)),
    ];

    let result = run_cli(
        &paths.wallet_cli(),
        &args,
        config.restore_timeout(),
        "wallet restore",
    );

    let output = match result {
        Ok(out) => out,
        Err(e) => {
            let _ = fs::remove_dir_all(&wallet_dir);
            return Err(e);
        }
    };

    if !wallet_db.exists() {
        let _ = fs::remove_dir_all(&wallet_dir);
        return Err(SupervisorError::WalletOperation(format!(
            "Wallet restore failed: {}",
            truncate(&output.text, 200)
        )));
    }

    Ok(())
}

/// Delete a wallet directory. The active wallet must be locked first.
pub fn delete_wallet(
    paths: &DataPaths,
    name: &str,
    active: Option<&str>,
) -> SupervisorResult<()> {
    let wallet_dir = paths.wallet_dir(name);
    if !wallet_dir.exists() {
        return Err(SupervisorError::WalletNotFound(name.to_string()));
    }
    if active == Some(name) {
        return Err(SupervisorError::ResourceBusy(
            "Cannot delete active wallet. Lock it first.".to_string(),
        ));
    }
    fs::remove_dir_all(&wallet_dir)?;
    log::info!("Wallet '{}' deleted", name);
    Ok(())
}

/// The CLI wants the seed as semicolon-joined words with a trailing
/// semicolon: `w1;w2;...;`
pub(crate) fn format_seed_phrase(seed: &str) -> String {
    let mut joined = seed.split_whitespace().collect::<Vec<_>>().join(";");
    joined.push(';');
    joined
}

/// Pull the generated seed phrase out of `beam-wallet init` output.
/// The label varies between releases; the words may be space- or
/// semicolon-separated.
pub(crate) fn extract_seed_phrase(output: &str) -> Option<String> {
    static SEED_RE: OnceLock<Regex> = OnceLock::new();
    static WORD_RE: OnceLock<Regex> = OnceLock::new();

    let seed_re = SEED_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:Generated seed phrase|Your seed phrase is|seed phrase)[:\s]+([a-z\s;]+)")
            .unwrap()
    });
    let word_re = WORD_RE.get_or_init(|| Regex::new(r"[a-z]+").unwrap());

    let captured = seed_re.captures(output)?.get(1)?.as_str().to_lowercase();
    let words: Vec<&str> = word_re
        .find_iter(&captured)
        .map(|m| m.as_str())
        .collect();
    if words.len() >= 12 {
        Some(words[..12].join(" "))
    } else {
        None
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_wallet_name_validation() {
        assert!(validate_wallet_name("main-wallet_2").is_ok());
        assert!(validate_wallet_name("../etc").is_err());
        assert!(validate_wallet_name("has space").is_err());
        assert!(validate_wallet_name("").is_err());
    }

    #[test]
    fn test_format_seed_phrase() {
        assert_eq!(
            format_seed_phrase("alpha bravo  charlie"),
            "alpha;bravo;charlie;"
        );
    }

    #[test]
    fn test_extract_seed_phrase_labeled() {
        let output = "Wallet created.\nGenerated seed phrase: one two three four five six seven eight nine ten eleven twelve\nDone.";
        assert_eq!(
            extract_seed_phrase(output).as_deref(),
            Some("one two three four five six seven eight nine ten eleven twelve")
        );
    }

    #[test]
    fn test_extract_seed_phrase_semicolons() {
        let output = "Your seed phrase is: one;two;three;four;five;six;seven;eight;nine;ten;eleven;twelve;";
        assert_eq!(
            extract_seed_phrase(output).as_deref(),
            Some("one two three four five six seven eight nine ten eleven twelve")
        );
    }

    #[test]
    fn test_extract_seed_phrase_too_short() {
        assert_eq!(extract_seed_phrase("seed phrase: one two three"), None);
        assert_eq!(extract_seed_phrase("no phrase here"), None);
    }

    #[test]
    fn test_list_wallets_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        for name in ["zeta", "alpha"] {
            let wdir = paths.wallet_dir(name);
            fs::create_dir_all(&wdir).unwrap();
            fs::write(wdir.join("wallet.db"), b"db").unwrap();
        }
        // Directory without a wallet.db is not a wallet
        fs::create_dir_all(paths.wallet_dir("empty")).unwrap();

        assert_eq!(list_wallets(&paths), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_delete_refuses_active_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();
        fs::create_dir_all(paths.wallet_dir("main")).unwrap();

        let err = delete_wallet(&paths, "main", Some("main")).unwrap_err();
        assert!(matches!(err, SupervisorError::ResourceBusy(_)));
        assert!(paths.wallet_dir("main").exists());

        delete_wallet(&paths, "main", None).unwrap();
        assert!(!paths.wallet_dir("main").exists());
    }

    #[test]
    fn test_delete_missing_wallet() {
        let paths = DataPaths::at(PathBuf::from("/tmp/blw-does-not-exist"));
        let err = delete_wallet(&paths, "ghost", None).unwrap_err();
        assert!(matches!(err, SupervisorError::WalletNotFound(_)));
    }

    #[test]
    fn test_create_without_binary_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::at(dir.path().to_path_buf());
        paths.ensure().unwrap();

        let err = create_wallet(
            &paths,
            &ServerConfig::default(),
            "fresh",
            &Secret::new("pw"),
        )
        .unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
        // Failed creation must not leave a half-made wallet dir behind
        assert!(!paths.wallet_dir("fresh").exists());
    }
}
