//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: backend
//! location, polling interval, request timeout, which credential store to
//! use, and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/quotadesk/config.json`. The
//! environment variables `QUOTADESK_API_URL` and
//! `QUOTADESK_CREDENTIAL_BACKEND` override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{ApiClient, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{FileSessionStore, KeychainSessionStore, SessionStore, NATIVE_KEYCHAIN};

/// Application name used for config/data directory paths
const APP_NAME: &str = "quotadesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_QUOTA_REFRESH_SECS: u64 = 30;

pub const ENV_API_URL: &str = "QUOTADESK_API_URL";
pub const ENV_CREDENTIAL_BACKEND: &str = "QUOTADESK_CREDENTIAL_BACKEND";

/// Where the session projection is kept between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keychain,
}

impl FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keychain" | "keyring" => Ok(CredentialBackend::Keychain),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub quota_refresh_secs: u64,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            quota_refresh_secs: DEFAULT_QUOTA_REFRESH_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_CREDENTIAL_BACKEND).ok(),
        );
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Record the last email used to sign in. Only that field is written
    /// back, so environment overrides never end up in the file.
    pub fn save_last_email(&mut self, email: &str) -> Result<()> {
        self.last_email = Some(email.to_string());
        let path = Self::config_path()?;
        let mut stored = Self::load_from(&path)?;
        stored.last_email = self.last_email.clone();
        stored.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_overrides(&mut self, api_url: Option<String>, backend: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = backend {
            match raw.parse() {
                Ok(backend) => self.credential_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_CREDENTIAL_BACKEND),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session store.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn quota_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.quota_refresh_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::with_timeout(&self.api_base_url, self.request_timeout())
    }

    /// Open the configured credential store.
    pub fn session_store(&self) -> Result<Box<dyn SessionStore>> {
        match self.credential_backend {
            CredentialBackend::File => Ok(Box::new(FileSessionStore::new(Self::data_dir()?))),
            CredentialBackend::Keychain if !NATIVE_KEYCHAIN => Err(anyhow::anyhow!(
                "No OS keychain on this platform; use the file credential backend"
            )),
            CredentialBackend::Keychain => Ok(Box::new(
                KeychainSessionStore::new().context("Failed to open keychain")?,
            )),
        }
    }
}
