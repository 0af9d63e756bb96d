//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to PromptFlam data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Relay configuration (`data/relay-config.json`).
    pub relay_config_file: PathBuf,
    /// Persisted key-value state (`data/store.json`).
    pub store_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the root if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            relay_config_file: root.join("relay-config.json"),
            store_file: root.join("store.json"),
            root,
        })
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptFlamConfig {
    /// Bind address.
    pub host: String,
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
}

impl PromptFlamConfig {
    pub const DEFAULT_PORT: u16 = 3000;

    /// Create configuration from environment and defaults.
    pub fn from_env() -> std::io::Result<Self> {
        let data_dir = std::env::var("PROMPTFLAM_DATA_DIR").unwrap_or_else(|_| "data".into());
        Self::with_data_dir(
            std::env::var("HOST").ok(),
            std::env::var("PORT").ok().as_deref(),
            data_dir,
        )
    }

    fn with_data_dir(
        host: Option<String>,
        port: Option<&str>,
        data_dir: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let port = port
            .and_then(|p| p.parse().ok())
            .unwrap_or(Self::DEFAULT_PORT);

        Ok(Self {
            host: host.unwrap_or_else(|| "0.0.0.0".into()),
            port,
            data_paths: DataPaths::new(data_dir)?,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
