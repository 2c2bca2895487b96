use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the default config file location when set.
pub const CONFIG_ENV_VAR: &str = "ALBUM_REFRESH_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Batches with more changed assets than this skip the accurate pass and
    /// ask observers to recheck instead.
    #[serde(default = "default_accurate_refresh_limit")]
    pub accurate_refresh_limit: usize,

    #[serde(default)]
    pub notify_hidden_albums: bool,
}

fn default_accurate_refresh_limit() -> usize {
    1000
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            accurate_refresh_limit: default_accurate_refresh_limit(),
            notify_hidden_albums: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifySink {
    #[default]
    Log,
    Stdout,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub sink: NotifySink,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("album-refresh")
        .join("albums.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            refresh: RefreshConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Loads the default config file, writing one with defaults if missing.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("album-refresh")
    }

    fn config_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::config_dir().join("config.toml"),
        }
    }
}
