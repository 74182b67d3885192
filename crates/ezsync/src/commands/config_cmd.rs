//! Config subcommand handlers.

use ezsync_config::{ConfigError, ConfigStore, KEYS};
use ezsync_core::ConfigPort;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config_file;
use crate::error::{CliError, valid_keys};

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_file(global);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        // ── Show: effective values, PSK masked ──────────────────────
        ConfigCommand::Show => {
            let mut cfg = ezsync_config::load_config(&path)?;
            if !cfg.wifi.psk.is_empty() {
                cfg.wifi.psk = "********".into();
            }
            let out = toml::to_string_pretty(&cfg).map_err(ConfigError::from)?;
            print!("{out}");
            Ok(())
        }

        // ── Get <section.key> ───────────────────────────────────────
        ConfigCommand::Get { key } => {
            let (section, name) = split_key(&key)?;
            let store = ConfigStore::with_config(&path, ezsync_config::load_config(&path)?);
            match store.get(&section, &name) {
                Some(value) => println!("{value}"),
                // Known but unset optional values print nothing.
                None if is_known(&section, &name) => {}
                None => {
                    return Err(CliError::UnknownKey {
                        key,
                        valid: valid_keys(),
                    });
                }
            }
            Ok(())
        }

        // ── Set <section.key> <value> ───────────────────────────────
        ConfigCommand::Set { key, value } => {
            let (section, name) = split_key(&key)?;
            let mut store = ConfigStore::open(&path)?;
            store.set(&section, &name, &value)?;
            store.save()?;
            eprintln!("✓ Set {section}.{name}");
            Ok(())
        }

        // ── SetPsk ──────────────────────────────────────────────────
        ConfigCommand::SetPsk => {
            let cfg = ezsync_config::load_config(&path)?;
            let psk = rpassword::prompt_password(format!("PSK for '{}': ", cfg.wifi.ssid))?;
            ezsync_config::store_psk(&cfg.wifi.ssid, &psk)?;
            eprintln!("✓ PSK stored in system keyring for '{}'", cfg.wifi.ssid);
            Ok(())
        }

        // ── Reset ───────────────────────────────────────────────────
        ConfigCommand::Reset => {
            let mut store = ConfigStore::open(&path)?;
            store.restore_defaults();
            store.save()?;
            eprintln!("✓ Settings restored to defaults");
            Ok(())
        }
    }
}

/// Split `section.key`, normalising case and dashes.
fn split_key(raw: &str) -> Result<(String, String), CliError> {
    let normalize = |s: &str| s.trim().to_ascii_lowercase().replace('-', "_");
    match raw.split_once('.') {
        Some((section, key)) if !section.is_empty() && !key.is_empty() => {
            Ok((normalize(section), normalize(key)))
        }
        _ => Err(CliError::Validation {
            field: "key".into(),
            reason: format!("expected section.key (e.g. settings.url), got '{raw}'"),
        }),
    }
}

fn is_known(section: &str, key: &str) -> bool {
    KEYS.iter().any(|(s, k)| *s == section && *k == key)
}
