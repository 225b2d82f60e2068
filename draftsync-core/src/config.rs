//! Server configuration stored at `<data-dir>/draftsync.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "draftsync.json";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// SQLite database file, relative paths resolve against the data dir.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Token file for [`crate::auth::TokenFileProvider`].
    pub tokens_file: Option<PathBuf>,
    /// Maximum request body size (bytes).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Accept empty snapshots against non-empty drafts.
    #[serde(default = "default_true")]
    pub allow_empty_snapshots: bool,
}

fn default_database() -> PathBuf {
    PathBuf::from("drafts.sqlite")
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            tokens_file: None,
            max_body_size: default_max_body_size(),
            allow_empty_snapshots: true,
        }
    }
}

impl ServerConfig {
    /// Load config from a data directory, falling back to defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read server config from {:?}", config_path))?;
        let config: ServerConfig = serde_json::from_str(&data)
            .with_context(|| "Failed to parse server config JSON")?;
        Ok(config)
    }

    /// Save config to a data directory.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let config_path = data_dir.join(CONFIG_FILE);
        let tmp_path = config_path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &config_path)?;
        Ok(())
    }

    /// Database path resolved against `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.database.is_absolute() {
            self.database.clone()
        } else {
            data_dir.join(&self.database)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_when_missing() {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.allow_empty_snapshots);
        assert_eq!(config.database_path(tmp.path()), tmp.path().join("drafts.sqlite"));
    }

    #[test]
    fn test_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig {
            database: PathBuf::from("/var/lib/draftsync/db.sqlite"),
            tokens_file: Some(PathBuf::from("tokens")),
            max_body_size: 4096,
            allow_empty_snapshots: false,
        };
        config.save(tmp.path()).unwrap();
        let loaded = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.database_path(tmp.path()), PathBuf::from("/var/lib/draftsync/db.sqlite"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), r#"{"tokens_file": "t.txt"}"#).unwrap();
        let loaded = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded.tokens_file, Some(PathBuf::from("t.txt")));
        assert_eq!(loaded.max_body_size, 1024 * 1024);
    }
}
