// ── Sync session orchestration ──
//
// One session = one worker task: connect and verify, scan, transfer, then
// disconnect no matter how the earlier phases ended. The shell talks to the
// session through `start` / `cancel` / `poll`; everything the worker has to
// say arrives over the bounded message queue and is dispatched to the
// injected status and progress ports.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ezsync_api::{IgnoreList, ListingClient, TransportConfig};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConnectionParams, SyncParams, VerifySpec};
use crate::error::CoreError;
use crate::message::{self, MESSAGE_CHANNEL_SIZE, Reporter, SessionMessage, SessionOutcome};
use crate::ports::{ProgressPort, ProgressValue, Severity, StatusPort};
use crate::shell::ShellExec;
use crate::sync::{ListingStatus, SyncEngine};
use crate::wifi::{ConnectEvent, ConnectPolicy, EnsureOutcome, WifiConnection};

/// Minimum time between a cancel and the next start.
pub const DEFAULT_RESTART_GATE: Duration = Duration::from_secs(2);

/// What `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDisposition {
    Started,
    /// Too soon after a cancel; nothing was started.
    Throttled { retry_in: Duration },
    AlreadyRunning,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    rx: mpsc::Receiver<SessionMessage>,
}

/// Drives sync sessions for a shell.
pub struct SyncSession<S: ShellExec> {
    wifi: Arc<WifiConnection<S>>,
    transport: TransportConfig,
    status: Arc<dyn StatusPort>,
    progress: Arc<dyn ProgressPort>,
    restart_gate: Duration,
    worker: Option<Worker>,
    /// Radio reset after a worker died without cleaning up; the next worker
    /// waits for it.
    reset: Option<JoinHandle<()>>,
    last_cancel: Option<Instant>,
}

impl<S: ShellExec> SyncSession<S> {
    pub fn new(
        wifi: Arc<WifiConnection<S>>,
        transport: TransportConfig,
        status: Arc<dyn StatusPort>,
        progress: Arc<dyn ProgressPort>,
    ) -> Self {
        Self {
            wifi,
            transport,
            status,
            progress,
            restart_gate: DEFAULT_RESTART_GATE,
            worker: None,
            reset: None,
            last_cancel: None,
        }
    }

    pub fn with_restart_gate(mut self, gate: Duration) -> Self {
        self.restart_gate = gate;
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    // ── Control surface ──────────────────────────────────────────────

    /// Start a session in the background.
    ///
    /// Configuration problems (bad URL, unwritable local path) are returned
    /// here, before any network action.
    pub fn start(
        &mut self,
        params: SyncParams,
        wifi_params: ConnectionParams,
    ) -> Result<StartDisposition, CoreError> {
        if self.is_running() {
            return Ok(StartDisposition::AlreadyRunning);
        }
        // A finished worker whose queue was never drained still owes the
        // ports its tail, terminal status included.
        if self.worker.is_some() {
            if let Some(outcome) = self.poll() {
                info!(%outcome, "delivered outcome of previous session");
            }
        }
        if let Some(at) = self.last_cancel {
            let elapsed = at.elapsed();
            if elapsed < self.restart_gate {
                let retry_in = self.restart_gate - elapsed;
                info!(?retry_in, "restart requested too soon after cancel, ignoring");
                return Ok(StartDisposition::Throttled { retry_in });
            }
        }

        params.validate()?;
        if wifi_params.ssid.trim().is_empty() {
            return Err(CoreError::Config {
                message: "no SSID provided".into(),
            });
        }
        prepare_local_root(&params.local_root)?;

        let ignore = IgnoreList::with_extra(params.ignore_names.iter().cloned());
        let client = ListingClient::new(&self.transport, ignore)?;
        let engine = SyncEngine::new(client, params.staleness(), self.transport.chunk_timeout);

        let (reporter, rx) = message::channel(MESSAGE_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            self.reset.take(),
            Arc::clone(&self.wifi),
            engine,
            params,
            wifi_params,
            cancel.clone(),
            reporter,
        ));

        self.worker = Some(Worker { handle, cancel, rx });
        info!("sync session started");
        Ok(StartDisposition::Started)
    }

    /// Stop the session and tear the connection down.
    ///
    /// Waits for the worker, whose cleanup disconnects, while still
    /// delivering its messages. Without a worker the radio is reset
    /// directly. Returns the session's outcome if it produced one.
    pub async fn cancel(&mut self) -> Option<SessionOutcome> {
        let mut outcome = None;

        if let Some(mut worker) = self.worker.take() {
            worker.cancel.cancel();
            let joined = loop {
                tokio::select! {
                    res = &mut worker.handle => break res,
                    Some(msg) = worker.rx.recv() => {
                        if let Some(o) = dispatch(self.status.as_ref(), self.progress.as_ref(), msg) {
                            outcome = Some(o);
                        }
                    }
                }
            };
            while let Ok(msg) = worker.rx.try_recv() {
                if let Some(o) = dispatch(self.status.as_ref(), self.progress.as_ref(), msg) {
                    outcome = Some(o);
                }
            }
            if let Err(e) = joined {
                warn!(error = %e, "sync worker ended abnormally");
                self.disconnect_direct().await;
            }
        } else {
            self.disconnect_direct().await;
        }

        self.last_cancel = Some(Instant::now());
        info!("sync session cancelled");
        outcome
    }

    /// Deliver queued messages to the ports without blocking.
    ///
    /// Returns the terminal outcome once the worker has reported it.
    pub fn poll(&mut self) -> Option<SessionOutcome> {
        let worker = self.worker.as_mut()?;
        loop {
            match worker.rx.try_recv() {
                Ok(msg) => {
                    if let Some(outcome) =
                        dispatch(self.status.as_ref(), self.progress.as_ref(), msg)
                    {
                        self.worker = None;
                        return Some(outcome);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.worker = None;
                    self.spawn_reset();
                    return Some(lost_worker(self.status.as_ref()));
                }
            }
        }
    }

    /// Await the terminal outcome, dispatching messages as they arrive.
    pub async fn wait(&mut self) -> Option<SessionOutcome> {
        let worker = self.worker.as_mut()?;
        while let Some(msg) = worker.rx.recv().await {
            if let Some(outcome) = dispatch(self.status.as_ref(), self.progress.as_ref(), msg) {
                self.worker = None;
                return Some(outcome);
            }
        }
        self.worker = None;
        let outcome = lost_worker(self.status.as_ref());
        self.disconnect_direct().await;
        Some(outcome)
    }

    async fn disconnect_direct(&self) {
        if let Err(e) = self.wifi.disconnect(true).await {
            warn!(error = %e, "direct disconnect failed");
            self.status
                .on_status(&format!("Disconnect failed: {e}"), Severity::Error);
        }
    }

    /// `poll` cannot await, so the reset runs as its own task.
    fn spawn_reset(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime to reset the radio after a lost worker");
            return;
        };
        let wifi = Arc::clone(&self.wifi);
        self.reset = Some(runtime.spawn(async move {
            if let Err(e) = wifi.disconnect(true).await {
                warn!(error = %e, "disconnect after lost worker failed");
            }
        }));
    }
}

fn dispatch(
    status: &dyn StatusPort,
    progress: &dyn ProgressPort,
    msg: SessionMessage,
) -> Option<SessionOutcome> {
    match msg {
        SessionMessage::Progress(update) => {
            progress.on_progress(ProgressValue::Percent(update.percent));
            None
        }
        SessionMessage::Status { message, severity } => {
            status.on_status(&message, severity);
            None
        }
        SessionMessage::NoFiles => {
            progress.on_progress(ProgressValue::NoFiles);
            None
        }
        SessionMessage::Finished(outcome) => Some(outcome),
    }
}

fn lost_worker(status: &dyn StatusPort) -> SessionOutcome {
    let reason = "sync worker stopped unexpectedly".to_owned();
    status.on_status(&reason, Severity::Error);
    SessionOutcome::Failed { reason }
}

/// Create the local root and make sure we can write into it.
fn prepare_local_root(root: &Path) -> Result<(), CoreError> {
    std::fs::create_dir_all(root).map_err(|e| CoreError::Config {
        message: format!("cannot create local path {}: {e}", root.display()),
    })?;
    let probe = root.join(format!(".ezsync-{}.probe", uuid::Uuid::new_v4().simple()));
    std::fs::write(&probe, b"").map_err(|e| CoreError::Config {
        message: format!("local path {} is not writable: {e}", root.display()),
    })?;
    if let Err(e) = std::fs::remove_file(&probe) {
        debug!(path = %probe.display(), error = %e, "could not remove writability check file");
    }
    Ok(())
}

// ── Worker ───────────────────────────────────────────────────────────

async fn run_worker<S: ShellExec>(
    pending_reset: Option<JoinHandle<()>>,
    wifi: Arc<WifiConnection<S>>,
    engine: SyncEngine,
    params: SyncParams,
    wifi_params: ConnectionParams,
    cancel: CancellationToken,
    reporter: Reporter,
) {
    if let Some(reset) = pending_reset {
        if let Err(e) = reset.await {
            warn!(error = %e, "radio reset task failed");
        }
    }
    let outcome = run_phases(&wifi, &engine, &params, &wifi_params, &cancel, &reporter).await;

    match wifi.disconnect(true).await {
        Ok(_) => reporter.info("Disconnected from Wi-Fi.").await,
        Err(e) => {
            warn!(error = %e, "disconnect failed");
            reporter.error(format!("Disconnect failed: {e}")).await;
        }
    }

    match &outcome {
        SessionOutcome::Completed { .. } => {
            reporter.info("File transfer completed successfully.").await;
        }
        SessionOutcome::Cancelled { .. } => reporter.info("Process stopped by user.").await,
        SessionOutcome::NoFiles | SessionOutcome::Failed { .. } => {}
    }
    info!(%outcome, "sync session finished");
    reporter.finished(outcome).await;
}

async fn run_phases<S: ShellExec>(
    wifi: &WifiConnection<S>,
    engine: &SyncEngine,
    params: &SyncParams,
    wifi_params: &ConnectionParams,
    cancel: &CancellationToken,
    reporter: &Reporter,
) -> SessionOutcome {
    let ssid = wifi_params.ssid.clone();
    reporter.info(format!("Connecting to {ssid}...")).await;

    // ── Connect ──
    let spec = VerifySpec::for_device(&ssid);
    let policy = ConnectPolicy {
        connect_attempts: params.retries,
        verify_attempts: params.verify_attempts,
        settle_delay: params.settle_delay,
        retry_delay: params.connection_delay,
    };
    let events = reporter.clone();
    let event_ssid = ssid.clone();
    let ensured = wifi
        .ensure_connected(wifi_params, &spec, &policy, cancel, move |event| {
            let reporter = events.clone();
            let ssid = event_ssid.clone();
            async move { report_connect_event(&reporter, &ssid, event).await }
        })
        .await;

    match ensured {
        Ok(EnsureOutcome::Connected) => {}
        Ok(EnsureOutcome::Cancelled) => return SessionOutcome::Cancelled { processed: 0 },
        Ok(EnsureOutcome::Exhausted { attempts }) => {
            let reason = format!("Failed to connect to {ssid} after {attempts} attempts.");
            reporter.error(reason.clone()).await;
            return SessionOutcome::Failed { reason };
        }
        Err(e) => {
            let reason = format!("Error: {e}");
            reporter.error(reason.clone()).await;
            return SessionOutcome::Failed { reason };
        }
    }

    // ── Scan ──
    reporter
        .info(format!("Using path: {}", params.local_root.display()))
        .await;
    if let Err(e) = tokio::fs::create_dir_all(&params.local_root).await {
        let reason = format!("Cannot create {}: {e}", params.local_root.display());
        reporter.error(reason.clone()).await;
        return SessionOutcome::Failed { reason };
    }
    reporter.info("Scanning for files to download...").await;

    let unreachable = match engine.probe(&params.remote_root).await {
        ListingStatus::Entries(_) => false,
        ListingStatus::Empty => {
            reporter
                .info("Directory listing is empty. Possibly no files or still an issue.")
                .await;
            false
        }
        ListingStatus::NoContainer => {
            warn!(url = %params.remote_root, "root page carries no directory listing");
            true
        }
        ListingStatus::Unreachable(e) => {
            warn!(error = %e, "root listing unreachable");
            true
        }
    };
    if unreachable {
        let reason = "Unable to retrieve directory listing. Connection issue suspected.".to_owned();
        reporter.error(reason.clone()).await;
        return SessionOutcome::Failed { reason };
    }

    let total = engine
        .compute_total(&params.remote_root, &params.local_root, cancel)
        .await;
    if cancel.is_cancelled() {
        return SessionOutcome::Cancelled { processed: 0 };
    }
    reporter.info(format!("Total files to sync: {total}")).await;

    if total == 0 {
        reporter
            .info("All files are up to date. No files to sync. Process completed.")
            .await;
        reporter.no_files().await;
        return SessionOutcome::NoFiles;
    }

    // ── Transfer ──
    let processed = engine
        .transfer(
            &params.remote_root,
            &params.local_root,
            total,
            cancel,
            reporter,
        )
        .await;

    if cancel.is_cancelled() {
        SessionOutcome::Cancelled { processed }
    } else if processed == total {
        SessionOutcome::Completed { processed }
    } else {
        let reason = format!("File transfer incomplete ({processed}/{total} files).");
        reporter.error(reason.clone()).await;
        SessionOutcome::Failed { reason }
    }
}

async fn report_connect_event(reporter: &Reporter, ssid: &str, event: ConnectEvent) {
    match event {
        ConnectEvent::AttemptStarted { attempt, of } if attempt > 1 => {
            reporter
                .info(format!("Connecting to {ssid}... (attempt {attempt}/{of})"))
                .await;
        }
        ConnectEvent::AttemptStarted { .. } => {}
        ConnectEvent::AttemptFailed {
            remaining, reason, ..
        } => {
            reporter
                .error(format!(
                    "Connection attempt failed: {reason}. Retries left: {remaining}"
                ))
                .await;
        }
        ConnectEvent::Verified { .. } => reporter.info(format!("Connected to {ssid}.")).await,
    }
}
