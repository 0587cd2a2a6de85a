use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{eyre::eyre, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tokenkeep_storage::symmetric_cipher::CIPHER_ID;
use tokenkeep_vault::VaultSettings;

/// Upper bound on `retention_days` (one hundred years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// User-level configuration loaded from `~/.config/tokenkeep/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory holding persisted records.
    pub data_dir: Option<PathBuf>,
    /// Id of the cipher used for token fields.
    pub cipher_target: Option<String>,
    /// Days a handle may go unused before the shutdown sweep removes it.
    pub retention_days: Option<i64>,
    pub shutdown_timeout_secs: Option<u64>,
    /// Environment variable holding a base64 key; takes precedence over the keyring.
    pub key_env: Option<String>,
    pub keyring: Option<KeyringConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct KeyringConfig {
    pub service: Option<String>,
    pub account: Option<String>,
}

impl Config {
    pub fn cipher_target(&self) -> &str {
        self.cipher_target.as_deref().unwrap_or(CIPHER_ID)
    }

    pub fn vault_settings(&self) -> VaultSettings {
        let defaults = VaultSettings::default();
        VaultSettings {
            retention_days: self.retention_days.unwrap_or(defaults.retention_days),
            shutdown_lock_timeout: self
                .shutdown_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_lock_timeout),
        }
    }

    /// Reject values that would make the shutdown sweep meaningless.
    pub fn validate(&self) -> Result<()> {
        if let Some(days) = self.retention_days {
            if !(1..=MAX_RETENTION_DAYS).contains(&days) {
                return Err(eyre!(
                    "retention_days must be between 1 and {MAX_RETENTION_DAYS}, got {days}"
                ));
            }
        }
        Ok(())
    }

    pub fn keyring_entry(&self) -> (String, String) {
        let keyring = self.keyring.clone().unwrap_or_default();
        (
            keyring.service.unwrap_or_else(|| "tokenkeep".to_string()),
            keyring.account.unwrap_or_else(|| "field-key".to_string()),
        )
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| eyre!("no config dir available"))?;
    Ok(base.join("tokenkeep").join("config.toml"))
}

/// Write the config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
