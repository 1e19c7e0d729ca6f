use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use shoplist_core::DEFAULT_UNIT;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Server URL (e.g., "http://localhost:8080")
    pub server_url: Option<ConfigValue<String>>,
    /// API key sent as a bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<ConfigValue<String>>,
    /// Unit given to items added without one
    pub default_unit: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    api_key: Option<String>,
    default_unit: Option<String>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    fn load_with(
        config_path: Option<PathBuf>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut server_url = None;
        let mut api_key = None;
        let mut default_unit = ConfigValue::new(DEFAULT_UNIT.to_string(), ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = Some(ConfigValue::new(url, ConfigSource::File));
            }
            if let Some(key) = file_config.api_key {
                api_key = Some(ConfigValue::new(key, ConfigSource::File));
            }
            if let Some(unit) = file_config.default_unit {
                default_unit = ConfigValue::new(unit, ConfigSource::File);
            }
        }

        if let Some(url) = var("SHOPLIST_SERVER_URL") {
            server_url = Some(ConfigValue::new(url, ConfigSource::Environment));
        }
        if let Some(key) = var("SHOPLIST_API_KEY") {
            api_key = Some(ConfigValue::new(key, ConfigSource::Environment));
        }
        if let Some(unit) = var("SHOPLIST_DEFAULT_UNIT") {
            default_unit = ConfigValue::new(unit, ConfigSource::Environment);
        }

        if default_unit.value.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "default_unit",
                "must not be blank".to_string(),
            ));
        }

        Ok(Self {
            server_url,
            api_key,
            default_unit,
            config_file,
        })
    }

    /// The server URL, or an error telling the user how to set it.
    pub fn require_server_url(&self) -> Result<&str, ConfigError> {
        self.server_url
            .as_ref()
            .map(|v| v.value.as_str())
            .ok_or(ConfigError::MissingServerUrl)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|v| v.value.as_str())
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/shoplist/
    /// - macOS: ~/Library/Application Support/shoplist/
    /// - Windows: %APPDATA%/shoplist/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shoplist")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
    MissingServerUrl,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(field, reason) => {
                write!(f, "Invalid config value for '{}': {}", field, reason)
            }
            ConfigError::MissingServerUrl => write!(
                f,
                "Server not configured. Set server_url in config or SHOPLIST_SERVER_URL."
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
