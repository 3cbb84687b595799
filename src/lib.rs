//! BEAM Light Wallet control server
//!
//! Supervises the two external processes behind the light wallet - the
//! wallet-api serving process and the beam-node full node - and exposes a
//! local HTTP control API for unlocking wallets and switching between the
//! public remote node and a locally run private node.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod process;
pub mod server;
pub mod supervisor;
pub mod wallet;

/// Expand environment variables and ~ in paths
/// Windows: %VAR% style
/// Unix: ~ expands to HOME
pub fn expand_path(path: &str) -> String {
    let mut result = path.to_string();

    #[cfg(windows)]
    {
        // Expand %VAR% style environment variables on Windows
        while let Some(start) = result.find('%') {
            if let Some(end) = result[start + 1..].find('%') {
                let var_name = &result[start + 1..start + 1 + end];
                if let Ok(value) = std::env::var(var_name) {
                    result = format!("{}{}{}", &result[..start], value, &result[start + 2 + end..]);
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    #[cfg(not(windows))]
    {
        // Expand ~ to HOME directory on Unix
        if result.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                result = format!("{}{}", home.display(), &result[1..]);
            }
        } else if result == "~" {
            if let Some(home) = dirs::home_dir() {
                result = home.to_string_lossy().to_string();
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_expand_tilde() {
        let expanded = expand_path("~/wallets");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/wallets"));
    }

    #[test]
    fn test_plain_path_unchanged() {
        assert_eq!(expand_path("/var/data"), "/var/data");
    }
}
