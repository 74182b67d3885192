// ── Core error types ──
//
// Errors surfaced by ezsync-core. Association and verification failures are
// not errors: they are reported as outcomes (`EnsureOutcome`,
// `SessionOutcome::Failed`). What remains here is configuration problems,
// fatal host problems, and lower-level transport or filesystem failures.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Host errors (fatal, not retried) ─────────────────────────────
    #[error("No wireless network interface found")]
    InterfaceNotFound,

    #[error("Cannot run `{program}`: {reason}")]
    CommandUnavailable { program: String, reason: String },

    // ── Remote errors ────────────────────────────────────────────────
    #[error("Device request failed: {message}")]
    Listing {
        message: String,
        /// HTTP status code (if the device answered).
        status: Option<u16>,
    },

    #[error("Download of {url} stalled: no data for {secs}s")]
    DownloadStalled { url: String, secs: u64 },

    // ── Local filesystem errors ──────────────────────────────────────
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying cannot help (missing interface or tooling).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InterfaceNotFound | Self::CommandUnavailable { .. } | Self::Config { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ezsync_api::Error> for CoreError {
    fn from(err: ezsync_api::Error) -> Self {
        match err {
            ezsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ezsync_api::Error::Client(message) => CoreError::Internal(message),
            other => CoreError::Listing {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}
