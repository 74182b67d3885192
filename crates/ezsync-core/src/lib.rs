//! Wi-Fi connection lifecycle and directory sync engine for ezsync.
//!
//! - **[`WifiConnection`]**: connect / verify / disconnect state machine
//!   over one wireless interface, driven through the [`ShellExec`] seam.
//!   [`ensure_connected`](WifiConnection::ensure_connected) is the only
//!   connect-phase retry loop.
//!
//! - **[`SyncEngine`]**: probes the card's root listing, counts stale files
//!   up front, then mirrors them depth-first with atomic downloads and
//!   cooperative cancellation.
//!
//! - **[`SyncSession`]**: one background worker per session. Reports
//!   through a bounded queue that the shell drains with
//!   [`poll`](SyncSession::poll) into its [`StatusPort`] and
//!   [`ProgressPort`].

pub mod config;
pub mod error;
pub mod message;
pub mod ports;
pub mod session;
pub mod shell;
pub mod sync;
pub mod wifi;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConnectionParams, Ipv4Subnet, StalenessPolicy, SyncParams, VerifySpec};
pub use error::CoreError;
pub use message::{ProgressUpdate, SessionMessage, SessionOutcome};
pub use ports::{ConfigPort, ProgressPort, ProgressValue, Severity, StatusPort};
pub use session::{StartDisposition, SyncSession};
pub use shell::{CommandOutput, ShellCommand, ShellExec, SystemShell};
pub use sync::{ListingStatus, SyncEngine, SyncProgress, should_download};
pub use wifi::{
    ConnectEvent, ConnectPolicy, ConnectionState, EnsureOutcome, NetworkIdentity, Platform,
    WifiConnection,
};
