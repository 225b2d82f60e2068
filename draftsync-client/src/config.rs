//! Client configuration (JSON).

use crate::queue::LocalQueue;
use crate::transport::{SyncTransport, TransportConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the draft server, e.g. `http://127.0.0.1:8080`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Pending sets that trigger an automatic sync.
    #[serde(default = "default_sync_threshold")]
    pub sync_threshold: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_sync_threshold() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    2
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: None,
            sync_threshold: default_sync_threshold(),
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Load config from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read client config from {:?}", path))?;
        serde_json::from_str(&data).with_context(|| format!("Failed to parse client config {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry settings for [`crate::SyncTransport`].
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_retries: self.max_retries,
        }
    }

    /// Pending-set queue for `workout_id` that syncs at `sync_threshold`.
    pub fn local_queue(&self, workout_id: impl Into<String>, transport: SyncTransport) -> LocalQueue {
        LocalQueue::new(workout_id, transport, self.sync_threshold)
    }
}
