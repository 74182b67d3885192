//! Clap derive structures for the `ezsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ezsync -- pull files off an ez Share Wi-Fi SD card
#[derive(Debug, Parser)]
#[command(
    name = "ezsync",
    version,
    about = "Sync files from an ez Share Wi-Fi SD card",
    long_about = "Joins the card's Wi-Fi network, mirrors new and changed files into a\n\
        local directory, then disconnects and restores the previous network.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "EZSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the card and download new files
    Sync(SyncArgs),

    /// Inspect and edit settings
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// One-off overrides for a sync run. Nothing here is saved.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Local directory to mirror into
    #[arg(long)]
    pub path: Option<String>,

    /// Listing URL of the card's root directory
    #[arg(long)]
    pub url: Option<String>,

    /// Card network name
    #[arg(long)]
    pub ssid: Option<String>,

    /// Wireless interface to use
    #[arg(long, short = 'i')]
    pub interface: Option<String>,

    /// Re-download files even when the local copy is newer
    #[arg(long, conflicts_with = "keep_old")]
    pub overwrite: bool,

    /// Never replace files that already exist locally
    #[arg(long)]
    pub keep_old: bool,

    /// Connect attempts before giving up
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// Skip the post-sync import even if it is enabled
    #[arg(long)]
    pub no_import: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (PSK masked)
    Show,

    /// Print the config file path
    Path,

    /// Print one value
    Get {
        /// Setting as section.key, e.g. "settings.url"
        key: String,
    },

    /// Set and save one value
    Set {
        /// Setting as section.key, e.g. "wifi.ssid"
        key: String,

        /// Value to set
        value: String,
    },

    /// Store the card's PSK in the system keyring
    SetPsk,

    /// Restore every setting to its default
    Reset,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
