//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the backend URL, the last used username, where the credential
//! token is kept, and the session timing knobs.
//!
//! Configuration is stored at `~/.config/labbook/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStore, KeyringTokenStore, SessionSettings, TokenStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "labbook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when neither the config nor the environment names one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Environment variable overriding the backend URL
pub const API_URL_ENV: &str = "LABBOOK_API_URL";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Liveness check interval in seconds.
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Tokens expiring within this many seconds are not restored on startup.
const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 300;

/// Upper bound for the timing values read from the config file (one day).
const MAX_TIMING_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// Plain file in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    pub token_storage: TokenStorage,
    pub request_timeout_secs: u64,
    pub check_interval_secs: u64,
    pub expiry_buffer_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            last_username: None,
            token_storage: TokenStorage::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted token when file storage is used.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Backend URL: environment first, then config, then the default.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(1, MAX_TIMING_SECS))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            check_interval: Duration::from_secs(self.check_interval_secs.clamp(1, MAX_TIMING_SECS)),
            expiry_buffer_secs: self.expiry_buffer_secs.clamp(0, MAX_TIMING_SECS as i64),
        }
    }

    /// The token store selected by `token_storage`.
    pub fn token_store(&self) -> Result<Box<dyn TokenStore>> {
        Ok(match self.token_storage {
            TokenStorage::File => Box::new(FileTokenStore::new(self.data_dir()?)),
            TokenStorage::Keyring => Box::new(KeyringTokenStore),
        })
    }
}
