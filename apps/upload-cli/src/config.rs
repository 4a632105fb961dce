//! Command-line configuration.
//!
//! An optional TOML file supplies defaults; command-line flags override it.
//!
//! ```toml
//! host = "192.168.1.20:8080"
//! directory = "/uploads"
//! force_text = false
//! close_retry_ms = 100
//! backpressure_poll_ms = 5
//! connect_timeout_secs = 10
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use frontporch_uploader::UploadConfig;
use serde::Deserialize;

/// Contents of the configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Server `host` or `host:port`.
    pub host: Option<String>,

    /// Destination directory on the server.
    pub directory: Option<String>,

    /// Always send base64 text payloads.
    pub force_text: bool,

    /// Close retry interval in milliseconds.
    pub close_retry_ms: Option<u64>,

    /// Backpressure poll interval in milliseconds.
    pub backpressure_poll_ms: Option<u64>,

    /// WebSocket handshake timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Builds the uploader configuration. `force_text` from the command line
    /// can only switch text mode on.
    pub fn upload_config(&self, force_text: bool) -> UploadConfig {
        let mut config = UploadConfig {
            force_text: self.force_text || force_text,
            ..UploadConfig::default()
        };
        if let Some(ms) = self.close_retry_ms {
            config.close_retry = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backpressure_poll_ms {
            config.backpressure_poll = Duration::from_millis(ms);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        config
    }
}
