//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ezsync_config::ConfigError;
use ezsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 4;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(ezsync::validation),
        help("Inspect the current settings with: ezsync config show")
    )]
    Validation { field: String, reason: String },

    #[error("Unknown setting '{key}'")]
    #[diagnostic(code(ezsync::unknown_key), help("Valid settings: {valid}"))]
    UnknownKey { key: String, valid: String },

    #[error("Could not load configuration")]
    #[diagnostic(
        code(ezsync::config),
        help("Fix or remove the file shown by: ezsync config path")
    )]
    Config(#[source] ConfigError),

    // ── Wi-Fi ────────────────────────────────────────────────────────
    #[error("No Wi-Fi interface found")]
    #[diagnostic(
        code(ezsync::no_interface),
        help(
            "Make sure a wireless adapter is present and enabled, or name one with\n\
             --interface / `ezsync config set wifi.interface <name>`."
        )
    )]
    NoInterface,

    #[error("Cannot run `{program}`")]
    #[diagnostic(
        code(ezsync::command_unavailable),
        help(
            "ezsync drives the system's network tools. On Linux install NetworkManager\n\
             (nmcli); on macOS `networksetup` ships with the OS.\n\
             Reason: {reason}"
        )
    )]
    CommandUnavailable { program: String, reason: String },

    // ── Sync ─────────────────────────────────────────────────────────
    #[error("Sync failed: {reason}")]
    #[diagnostic(
        code(ezsync::sync_failed),
        help(
            "Check that the card is powered and in range, then retry with -v for details."
        )
    )]
    SyncFailed { reason: String },

    #[error("Sync interrupted")]
    #[diagnostic(code(ezsync::interrupted))]
    Interrupted,

    #[error("Import command `{command}` failed ({status})")]
    #[diagnostic(
        code(ezsync::import_failed),
        help("Files were synced. Fix settings.import_command or pass --no-import.")
    )]
    Import { command: String, status: String },

    #[error("{0}")]
    #[diagnostic(code(ezsync::internal))]
    Core(CoreError),

    #[error("IO error: {0}")]
    #[diagnostic(code(ezsync::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::UnknownKey { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            Self::NoInterface | Self::CommandUnavailable { .. } | Self::SyncFailed { .. } => {
                exit_code::CONNECTION
            }
            Self::Interrupted => exit_code::INTERRUPTED,
            Self::Import { .. } | Self::Core(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InterfaceNotFound => Self::NoInterface,
            CoreError::CommandUnavailable { program, reason } => {
                Self::CommandUnavailable { program, reason }
            }
            CoreError::Config { message } => Self::Validation {
                field: "configuration".into(),
                reason: message,
            },
            other => Self::Core(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownKey { section, key } => Self::UnknownKey {
                key: format!("{section}.{key}"),
                valid: valid_keys(),
            },
            other => Self::Config(other),
        }
    }
}

pub fn valid_keys() -> String {
    ezsync_config::KEYS
        .iter()
        .map(|(section, key)| format!("{section}.{key}"))
        .collect::<Vec<_>>()
        .join(", ")
}
