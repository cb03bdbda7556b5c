//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{StreamSeverity, DEFAULT_CHUNK_SIZE};

/// Settings for [`crate::server::Server`].
///
/// Every field has a default, so an empty JSON object `{}` is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Number of connection-serving worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Records per batch when a request has no `chunksize`
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: usize,

    /// How long to wait for a client to send its request head
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// How long a write to a stalled client may block before the response is abandoned
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Pause after each data frame (demonstration throttle); off when unset
    #[serde(default)]
    pub frame_delay_ms: Option<u64>,

    /// If set, request paths resolve against this directory and may not leave it
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    /// Stream failures at or above this severity are raised as alerts
    #[serde(default = "default_alert_severity")]
    pub alert_at_or_above: StreamSeverity,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
            default_chunk_size: default_chunk_size(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            frame_delay_ms: None,
            data_root: None,
            alert_at_or_above: default_alert_severity(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be > 0");
        }
        if self.default_chunk_size == 0 {
            anyhow::bail!("default_chunk_size must be > 0");
        }
        if self.read_timeout_ms == 0 {
            anyhow::bail!("read_timeout_ms must be > 0");
        }
        if self.write_timeout_ms == 0 {
            anyhow::bail!("write_timeout_ms must be > 0");
        }
        if let Some(root) = &self.data_root {
            if !root.is_dir() {
                anyhow::bail!("data_root {} is not a directory", root.display());
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn frame_delay(&self) -> Option<Duration> {
        self.frame_delay_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

// Default value functions for serde
fn default_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_workers() -> usize { 4 }
fn default_chunk_size() -> usize { DEFAULT_CHUNK_SIZE }
fn default_read_timeout_ms() -> u64 { 10_000 }
fn default_write_timeout_ms() -> u64 { 60_000 }
fn default_alert_severity() -> StreamSeverity { StreamSeverity::Critical }
