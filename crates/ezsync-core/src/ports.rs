// ── Collaborator interfaces ──
//
// The narrow surfaces a shell implements (status and progress display)
// or provides (settings storage). Core never talks to a UI or reads a file
// directly; it only sees these traits.

use std::fmt;

/// How a status line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// A numeric progress update, or the "nothing to sync" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressValue {
    /// Percentage in `[0, 100]`.
    Percent(f64),
    NoFiles,
}

/// Receives human-readable status lines.
pub trait StatusPort: Send + Sync {
    fn on_status(&self, message: &str, severity: Severity);
}

/// Receives numeric progress.
pub trait ProgressPort: Send + Sync {
    fn on_progress(&self, value: ProgressValue);
}

/// Settings storage, addressed by `section` and `key`.
///
/// Values cross this boundary as strings; implementations parse and
/// validate them against their own schema.
pub trait ConfigPort {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get(&self, section: &str, key: &str) -> Option<String>;

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Persist the current values.
    fn save(&self) -> Result<(), Self::Error>;

    /// Reset every value to its default (not persisted until `save`).
    fn restore_defaults(&mut self);
}
