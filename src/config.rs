use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming an optional YAML configuration file.
pub const CONFIG_ENV: &str = "SWITCHYARD_CONFIG";

/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Size of the buffer each sniffer receive call fills.
    pub read_chunk_size: usize,
    /// Largest header section accepted before the request is rejected. The
    /// parser buffers no more than this until the section is complete.
    pub max_header_bytes: usize,
    /// Close the connection when the parser refuses delivered bytes. When
    /// off, the refused bytes are dropped with a warning.
    pub close_on_protocol_mismatch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            read_chunk_size: 4096,
            max_header_bytes: 16 * 1024,
            close_on_protocol_mismatch: true,
        }
    }
}

impl Config {
    /// Loads the file named by `SWITCHYARD_CONFIG` (if any), then applies the
    /// `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var(LISTEN_ENV) {
            cfg.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(content).context("invalid config document")?;

        if cfg.read_chunk_size == 0 {
            anyhow::bail!("read_chunk_size must be greater than zero");
        }

        Ok(cfg)
    }
}
