//! Connection settings.
//!
//! ```toml
//! path = "blog.db"
//! busy_timeout_ms = 5000
//! journal_mode = "wal"
//! foreign_keys = true
//! ```

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqliteError};

const JOURNAL_MODES: &[&str] = &["delete", "truncate", "persist", "memory", "wal", "off"];

fn default_path() -> String {
    ":memory:".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_journal_mode() -> String {
    "wal".to_string()
}

fn default_foreign_keys() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Ignored for in-memory databases.
    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,

    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: default_journal_mode(),
            foreign_keys: default_foreign_keys(),
        }
    }
}

impl SqliteConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SqliteConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let mode = self.journal_mode.to_ascii_lowercase();
        if !JOURNAL_MODES.contains(&mode.as_str()) {
            return Err(SqliteError::InvalidJournalMode(self.journal_mode.clone()));
        }
        Ok(())
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = SqliteConfig::from_toml_str(r#"path = "blog.db""#).unwrap();

        assert_eq!(config.path, "blog.db");
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.journal_mode, "wal");
        assert!(config.foreign_keys);
        assert!(!config.is_memory());
        assert!(SqliteConfig::default().is_memory());
    }

    #[test]
    fn test_invalid_journal_mode() {
        assert!(matches!(
            SqliteConfig::from_toml_str(r#"journal_mode = "fast""#),
            Err(SqliteError::InvalidJournalMode(_))
        ));
        assert!(matches!(
            SqliteConfig::from_toml_str("busy_timeout_ms = \"soon\""),
            Err(SqliteError::TomlDeError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "busy_timeout_ms = 250\nforeign_keys = false").unwrap();

        let config = SqliteConfig::from_file(file.path()).unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(!config.foreign_keys);
        assert!(config.is_memory());
    }
}
