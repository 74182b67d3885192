//! Configuration for ezsync.
//!
//! A TOML file with two sections (`[settings]` and `[wifi]`), layered as
//! built-in defaults, then the file, then `EZSYNC_` environment variables.
//! The PSK is resolved separately (env var, system keyring, plaintext) and
//! never leaves this crate except as a `SecretString`.
//!
//! [`ConfigStore`] implements `ezsync_core::ConfigPort` on top of the same
//! file for shells that edit settings.

mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use ezsync_core::{ConnectionParams, SyncParams};

pub use store::{ConfigStore, KEYS};

/// Prefix for environment overrides, e.g. `EZSYNC_SETTINGS__RETRIES=5`.
pub const ENV_PREFIX: &str = "EZSYNC_";

/// Environment variable that overrides the PSK from every other source.
pub const PSK_ENV: &str = "EZSYNC_PSK";

const KEYRING_SERVICE: &str = "ezsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown setting '{section}.{key}'")]
    UnknownKey { section: String, key: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub wifi: WifiSettings,
}

/// What to sync and how.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Local mirror root; a leading `~` is expanded.
    pub path: String,

    /// Listing URL of the card's root directory.
    pub url: String,

    /// Re-download files even when the local copy is newer.
    pub overwrite: bool,

    /// Never replace a file that already exists locally.
    pub keep_old: bool,

    /// Extra entry names to skip on the card.
    pub ignore: Vec<String>,

    /// Connect attempts before giving up.
    pub retries: u32,

    /// Seconds between connect attempts.
    pub connection_delay: u64,

    pub quit_after_completion: bool,

    /// Run `import_command` after a successful sync.
    pub import_after_sync: bool,

    pub import_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: "~/Documents/CPAP_Data/SD_card".into(),
            url: "http://192.168.4.1/dir?dir=A:".into(),
            overwrite: false,
            keep_old: false,
            ignore: Vec::new(),
            retries: 3,
            connection_delay: 5,
            quit_after_completion: false,
            import_after_sync: false,
            import_command: None,
        }
    }
}

/// The card's access point.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WifiSettings {
    pub ssid: String,

    /// Plaintext PSK (prefer the keyring or `EZSYNC_PSK`).
    pub psk: String,

    /// Wireless interface; discovered when unset.
    pub interface: Option<String>,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            ssid: "ez Share".into(),
            psk: "88888888".into(),
            interface: None,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ezsync", "ezsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = BaseDirs::new().map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
    p.push(".config");
    p.push("ezsync");
    p
}

// ── Loading / saving ────────────────────────────────────────────────

/// Defaults merged with the file at `path` only. This is what gets saved.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .extract()?;
    Ok(config)
}

/// The effective configuration: defaults, then the file, then environment.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

// ── PSK resolution ──────────────────────────────────────────────────

/// Resolve the PSK: `EZSYNC_PSK`, then the keyring entry for the SSID,
/// then the plaintext value from the file.
pub fn resolve_psk(wifi: &WifiSettings) -> SecretString {
    if let Some(psk) = std::env::var(PSK_ENV).ok().filter(|v| !v.is_empty()) {
        debug!("using PSK from environment");
        return SecretString::from(psk);
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(&wifi.ssid)) {
        if let Ok(psk) = entry.get_password() {
            debug!(ssid = %wifi.ssid, "using PSK from keyring");
            return SecretString::from(psk);
        }
    }

    SecretString::from(wifi.psk.clone())
}

/// Store the PSK for `ssid` in the system keyring.
pub fn store_psk(ssid: &str, psk: &str) -> Result<(), ConfigError> {
    validate_psk(psk)?;
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(ssid))?;
    entry.set_password(psk)?;
    Ok(())
}

fn keyring_user(ssid: &str) -> String {
    format!("{ssid}/psk")
}

// ── Translation to core parameters ──────────────────────────────────

impl Config {
    /// Check every field that can be checked offline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.path.trim().is_empty() {
            return Err(ConfigError::invalid("settings.path", "must not be empty"));
        }
        parse_url(&self.settings.url)?;
        if self.settings.retries == 0 {
            return Err(ConfigError::invalid("settings.retries", "must be at least 1"));
        }
        if self.wifi.ssid.trim().is_empty() {
            return Err(ConfigError::invalid("wifi.ssid", "must not be empty"));
        }
        Ok(())
    }

    pub fn local_root(&self) -> PathBuf {
        expand_tilde(&self.settings.path)
    }

    pub fn to_sync_params(&self) -> Result<SyncParams, ConfigError> {
        self.validate()?;
        let s = &self.settings;

        let mut params = SyncParams::new(self.local_root(), parse_url(&s.url)?);
        params.overwrite = s.overwrite;
        params.keep_old = s.keep_old;
        params.ignore_names = s
            .ignore
            .iter()
            .map(String::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .collect();
        params.retries = s.retries;
        params.connection_delay = Duration::from_secs(s.connection_delay);

        params
            .validate()
            .map_err(|e| ConfigError::invalid("settings", e.to_string()))?;
        Ok(params)
    }

    pub fn to_connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            ssid: self.wifi.ssid.clone(),
            psk: resolve_psk(&self.wifi),
            interface: self
                .wifi
                .interface
                .clone()
                .filter(|i| !i.trim().is_empty()),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = || BaseDirs::new().map(|d| d.home_dir().to_path_buf());
    if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::invalid("settings.url", format!("'{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(ConfigError::invalid(
            "settings.url",
            format!("'{raw}' is not an http(s) URL with a host"),
        ));
    }
    Ok(url)
}

/// WPA2 passphrases are 8 to 63 characters.
pub(crate) fn validate_psk(psk: &str) -> Result<(), ConfigError> {
    let len = psk.chars().count();
    if (8..=63).contains(&len) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "wifi.psk",
            format!("must be 8 to 63 characters, got {len}"),
        ))
    }
}
