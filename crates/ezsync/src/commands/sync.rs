//! `ezsync sync`: run one session in the foreground.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ezsync_api::TransportConfig;
use ezsync_config::Config;
use ezsync_core::{
    ProgressPort, ProgressValue, SessionOutcome, Severity, ShellExec, StartDisposition,
    StatusPort, SyncSession, SystemShell, WifiConnection,
};

use crate::cli::{GlobalOpts, SyncArgs};
use crate::config_file;
use crate::error::CliError;

/// How often the session queue is drained.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn handle(args: SyncArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = ezsync_config::load_config(&config_file(global))?;
    apply_overrides(&mut cfg, &args);

    let params = cfg.to_sync_params()?;
    let wifi_params = cfg.to_connection_params();

    let terminal = Arc::new(Terminal::new(global.quiet));
    let wifi = Arc::new(WifiConnection::new(SystemShell::default()));
    let mut session = SyncSession::new(
        wifi,
        TransportConfig::default(),
        terminal.clone(),
        terminal.clone(),
    );

    match session.start(params, wifi_params)? {
        StartDisposition::Started => {}
        other => {
            return Err(CliError::SyncFailed {
                reason: format!("session did not start: {other:?}"),
            });
        }
    }

    let interrupted = CancellationToken::new();
    let ctrl_c_task = {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.cancel();
            }
        })
    };

    let outcome = drive(&mut session, &interrupted).await;
    ctrl_c_task.abort();
    terminal.finish(&outcome);

    if outcome.is_success() && cfg.settings.import_after_sync && !args.no_import {
        run_import(cfg.settings.import_command.as_deref()).await?;
    }

    match outcome {
        SessionOutcome::Completed { .. } | SessionOutcome::NoFiles => Ok(()),
        SessionOutcome::Cancelled { .. } => Err(CliError::Interrupted),
        SessionOutcome::Failed { reason } => Err(CliError::SyncFailed { reason }),
    }
}

fn apply_overrides(cfg: &mut Config, args: &SyncArgs) {
    let s = &mut cfg.settings;
    if let Some(path) = &args.path {
        s.path.clone_from(path);
    }
    if let Some(url) = &args.url {
        s.url.clone_from(url);
    }
    if args.overwrite {
        s.overwrite = true;
        s.keep_old = false;
    }
    if args.keep_old {
        s.keep_old = true;
        s.overwrite = false;
    }
    if let Some(retries) = args.retries {
        s.retries = retries;
    }
    if let Some(ssid) = &args.ssid {
        cfg.wifi.ssid.clone_from(ssid);
    }
    if args.interface.is_some() {
        cfg.wifi.interface.clone_from(&args.interface);
    }
}

/// Poll the session until it reports an outcome, cancelling on Ctrl-C.
async fn drive<S: ShellExec>(
    session: &mut SyncSession<S>,
    interrupted: &CancellationToken,
) -> SessionOutcome {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            biased;
            () = interrupted.cancelled() => {
                info!("interrupt received, stopping sync");
                return session
                    .cancel()
                    .await
                    .unwrap_or(SessionOutcome::Cancelled { processed: 0 });
            }
            _ = tick.tick() => {
                if let Some(outcome) = session.poll() {
                    return outcome;
                }
            }
        }
    }
}

/// Run the configured importer through the platform shell.
async fn run_import(command: Option<&str>) -> Result<(), CliError> {
    let Some(command) = command.map(str::trim).filter(|c| !c.is_empty()) else {
        warn!("import_after_sync is set but import_command is empty, skipping");
        return Ok(());
    };

    let (shell, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };
    info!(command, "running import command");
    let status = tokio::process::Command::new(shell)
        .arg(flag)
        .arg(command)
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(CliError::Import {
            command: command.to_owned(),
            status: status.to_string(),
        })
    }
}

// ── Terminal ports ──────────────────────────────────────────────────

/// Status lines above a percentage bar; errors always go to stderr.
struct Terminal {
    bar: ProgressBar,
}

impl Terminal {
    fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        Self { bar }
    }

    fn finish(&self, outcome: &SessionOutcome) {
        self.bar.finish_and_clear();
        if !self.bar.is_hidden() {
            eprintln!("{outcome}");
        }
    }
}

impl StatusPort for Terminal {
    fn on_status(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => {
                self.bar.set_message(message.to_owned());
                self.bar.println(message);
            }
            Severity::Error => self.bar.suspend(|| eprintln!("error: {message}")),
        }
    }
}

impl ProgressPort for Terminal {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    fn on_progress(&self, value: ProgressValue) {
        match value {
            ProgressValue::Percent(p) => self.bar.set_position(p.clamp(0.0, 100.0).round() as u64),
            ProgressValue::NoFiles => self.bar.set_position(100),
        }
    }
}
