// ── ConfigStore ──
//
// String-addressed view of the config file for shells. Values are parsed
// and validated on `set`; nothing is written until `save`.

use std::path::{Path, PathBuf};

use tracing::info;

use ezsync_core::ConfigPort;

use crate::{Config, ConfigError, load_file, parse_url, save_config, validate_psk};

/// Every `section.key` the store understands.
pub const KEYS: &[(&str, &str)] = &[
    ("settings", "path"),
    ("settings", "url"),
    ("settings", "overwrite"),
    ("settings", "keep_old"),
    ("settings", "ignore"),
    ("settings", "retries"),
    ("settings", "connection_delay"),
    ("settings", "quit_after_completion"),
    ("settings", "import_after_sync"),
    ("settings", "import_command"),
    ("wifi", "ssid"),
    ("wifi", "psk"),
    ("wifi", "interface"),
];

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Load the file at `path`, falling back to defaults for anything it
    /// does not set. A missing file is not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = load_file(&path)?;
        Ok(Self { path, config })
    }

    pub fn with_config(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl ConfigPort for ConfigStore {
    type Error = ConfigError;

    fn get(&self, section: &str, key: &str) -> Option<String> {
        let s = &self.config.settings;
        let w = &self.config.wifi;
        let value = match (normalize(section).as_str(), normalize(key).as_str()) {
            ("settings", "path") => s.path.clone(),
            ("settings", "url") => s.url.clone(),
            ("settings", "overwrite") => s.overwrite.to_string(),
            ("settings", "keep_old") => s.keep_old.to_string(),
            ("settings", "ignore") => s.ignore.join(","),
            ("settings", "retries") => s.retries.to_string(),
            ("settings", "connection_delay") => s.connection_delay.to_string(),
            ("settings", "quit_after_completion") => s.quit_after_completion.to_string(),
            ("settings", "import_after_sync") => s.import_after_sync.to_string(),
            ("settings", "import_command") => s.import_command.clone()?,
            ("wifi", "ssid") => w.ssid.clone(),
            ("wifi", "psk") => w.psk.clone(),
            ("wifi", "interface") => w.interface.clone()?,
            _ => return None,
        };
        Some(value)
    }

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let section = normalize(section);
        let key = normalize(key);
        let field = format!("{section}.{key}");
        let s = &mut self.config.settings;
        let w = &mut self.config.wifi;

        match (section.as_str(), key.as_str()) {
            ("settings", "path") => s.path = non_empty(&field, value)?,
            ("settings", "url") => s.url = parse_url(value)?.to_string(),
            ("settings", "overwrite") => s.overwrite = parse_bool(&field, value)?,
            ("settings", "keep_old") => s.keep_old = parse_bool(&field, value)?,
            ("settings", "ignore") => {
                s.ignore = value
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            ("settings", "retries") => {
                let retries: u32 = parse_number(&field, value)?;
                if retries == 0 {
                    return Err(ConfigError::invalid(&field, "must be at least 1"));
                }
                s.retries = retries;
            }
            ("settings", "connection_delay") => {
                s.connection_delay = parse_number(&field, value)?;
            }
            ("settings", "quit_after_completion") => {
                s.quit_after_completion = parse_bool(&field, value)?;
            }
            ("settings", "import_after_sync") => {
                s.import_after_sync = parse_bool(&field, value)?;
            }
            ("settings", "import_command") => s.import_command = optional(value),
            ("wifi", "ssid") => w.ssid = non_empty(&field, value)?,
            ("wifi", "psk") => {
                validate_psk(value)?;
                w.psk = value.to_owned();
            }
            ("wifi", "interface") => w.interface = optional(value),
            _ => return Err(ConfigError::UnknownKey { section, key }),
        }
        Ok(())
    }

    fn save(&self) -> Result<(), ConfigError> {
        save_config(&self.path, &self.config)
    }

    fn restore_defaults(&mut self) {
        info!("settings restored to defaults");
        self.config = Config::default();
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

fn non_empty(field: &str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(value.to_owned())
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(ConfigError::invalid(
            field,
            format!("expected true or false, got '{other}'"),
        )),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("expected a whole number, got '{value}'")))
}
