//! In-memory secret wrapper
//!
//! Passwords and owner keys live only in process memory, are never written
//! to disk, and never appear in logs in full. Wrapping them makes that
//! contract enforceable: Display and Debug are redacted, and `clear()`
//! erases the value on lock or restart.

use std::fmt;

/// A credential held in memory
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for building process arguments
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Erase the value in place
    pub fn clear(&mut self) {
        self.0 = String::new();
    }

    /// A truncated preview safe for diagnostics (first 8 characters)
    pub fn preview(&self) -> String {
        if self.0.len() > 8 {
            format!("{}...", &self.0[..8])
        } else {
            "***".to_string()
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_redacted() {
        let secret = Secret::new("correct horse battery staple");
        assert_eq!(format!("{}", secret), "***");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert!(!format!("{:?}", secret).contains("horse"));
    }

    #[test]
    fn test_preview_truncates() {
        let key = Secret::new("a3f29b8c71d05e64ffffffff");
        assert_eq!(key.preview(), "a3f29b8c...");
        assert_eq!(Secret::new("short").preview(), "***");
    }

    #[test]
    fn test_clear_erases() {
        let mut secret = Secret::new("hunter2");
        secret.clear();
        assert!(secret.is_empty());
        assert_eq!(secret.expose(), "");
    }
}
