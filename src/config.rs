//! Server configuration.
//!
//! Environment variables:
//! - `SHOPLIST_PORT`: Port to listen on (default: 8080)
//! - `SHOPLIST_DATA_DIR`: Base directory for data (default: ~/.local/share/shoplist-server)
//! - `SHOPLIST_DATABASE_PATH`: SQLite file (default: `<data dir>/shoplist.db`)
//! - `SHOPLIST_BLOB_DIR`: Image directory (default: `<data dir>/blobs`)
//! - `SHOPLIST_PUBLIC_URL`: Base URL used in image links (default: http://localhost:<port>)
//! - `SHOPLIST_CONFIG`: Path to the key file (default: ~/.config/shoplist-server/config.yaml)
//!
//! # Key File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// API key entry in the key file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
}

/// Key file structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

impl ConfigFile {
    /// Reads the key file. A missing file yields no keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!("Config file {} not found", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
    pub public_url: String,
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let port = var("SHOPLIST_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = var("SHOPLIST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("shoplist-server")
            });

        let database_path = var("SHOPLIST_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("shoplist.db"));

        let blob_dir = var("SHOPLIST_BLOB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("blobs"));

        let public_url = var("SHOPLIST_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let config_path = var("SHOPLIST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("shoplist-server")
                    .join("config.yaml")
            });

        Self {
            port,
            database_path,
            blob_dir,
            public_url,
            config_path,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
