// ── Wi-Fi connection lifecycle ──
//
// Owns the connect / verify / disconnect state machine for one logical
// Wi-Fi session. The host's network configuration is a singleton, so every
// public method serialises on one async mutex; the retry loop in
// `ensure_connected` holds it for the whole sequence.
//
//   Disconnected -> Connecting -> Verifying -> Connected
//   Connecting | Verifying -> Failed(reason) -> (disconnect and reset) -> Disconnected
//   Connected -> Disconnecting -> Disconnected

pub mod platform;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConnectionParams, VerifySpec};
use crate::error::CoreError;
use crate::shell::{CommandOutput, ShellExec};

pub use platform::{NetworkIdentity, Platform};

// ── ConnectionState ──────────────────────────────────────────────────

/// Lifecycle state of the Wi-Fi session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Verifying,
    Connected,
    Disconnecting,
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Verifying => f.write_str("verifying"),
            Self::Connected => f.write_str("connected"),
            Self::Disconnecting => f.write_str("disconnecting"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ── Retry loop types ─────────────────────────────────────────────────

/// Budget for [`WifiConnection::ensure_connected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// Connect attempts (each followed by verification).
    pub connect_attempts: u32,
    /// Verification attempts per connect attempt.
    pub verify_attempts: u32,
    /// Wait before each verification attempt.
    pub settle_delay: Duration,
    /// Fixed wait between failed connect attempts.
    pub retry_delay: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            verify_attempts: 5,
            settle_delay: Duration::from_secs(2),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Progress of the connect retry loop, reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectEvent {
    AttemptStarted { attempt: u32, of: u32 },
    AttemptFailed { attempt: u32, remaining: u32, reason: String },
    Verified { attempt: u32 },
}

/// How [`WifiConnection::ensure_connected`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Connected,
    Exhausted { attempts: u32 },
    Cancelled,
}

// ── WifiConnection ───────────────────────────────────────────────────

struct Inner {
    state: ConnectionState,
    /// Discovered or configured interface; stable for the instance lifetime.
    interface: Option<String>,
    /// SSID of the network joined by this session, forgotten on disconnect.
    session_ssid: Option<String>,
}

/// State machine over one wireless interface.
pub struct WifiConnection<S> {
    shell: S,
    platform: Platform,
    inner: Mutex<Inner>,
}

impl<S: ShellExec> WifiConnection<S> {
    pub fn new(shell: S) -> Self {
        Self::with_platform(shell, Platform::current())
    }

    pub fn with_platform(shell: S, platform: Platform) -> Self {
        Self {
            shell,
            platform,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                interface: None,
                session_ssid: None,
            }),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state.clone()
    }

    // ── Public operations ────────────────────────────────────────────

    /// Find the wireless interface. Cached after the first success.
    pub async fn discover_interface(&self) -> Result<String, CoreError> {
        let mut inner = self.inner.lock().await;
        self.resolve_interface(&mut inner, None).await
    }

    /// Issue the association command.
    ///
    /// `true` only means the command succeeded; the link still has to pass
    /// [`verify`](Self::verify) before the state reaches `Connected`.
    pub async fn connect(&self, params: &ConnectionParams) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().await;
        self.connect_locked(&mut inner, params).await
    }

    /// Check that the association is real and usable.
    pub async fn verify(
        &self,
        spec: &VerifySpec,
        max_attempts: u32,
        settle_delay: Duration,
    ) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().await;
        self.verify_locked(&mut inner, spec, max_attempts, settle_delay, None)
            .await
    }

    /// Read the current SSID/BSSID, trying each platform probe in order.
    pub async fn current_network_identity(&self) -> Result<Option<NetworkIdentity>, CoreError> {
        let mut inner = self.inner.lock().await;
        let interface = self.resolve_interface(&mut inner, None).await?;
        self.identity_on(&interface).await
    }

    /// Deassociate by power-cycling the radio, optionally forgetting the
    /// session's network first. Always ends in `Disconnected`.
    pub async fn disconnect(&self, forget: bool) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().await;
        self.disconnect_locked(&mut inner, forget).await
    }

    /// Connect and verify, retrying with a fixed delay.
    ///
    /// Host errors that retrying cannot fix (no interface, missing tooling)
    /// are returned at once; any other error counts as a failed attempt.
    /// Every failed attempt is followed by a forgetting disconnect so the
    /// next one starts clean. `cancel` is observed before each attempt,
    /// during settle delays and during the delay between attempts.
    pub async fn ensure_connected<F, Fut>(
        &self,
        params: &ConnectionParams,
        spec: &VerifySpec,
        policy: &ConnectPolicy,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<EnsureOutcome, CoreError>
    where
        F: FnMut(ConnectEvent) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let mut inner = self.inner.lock().await;
        let attempts = policy.connect_attempts.max(1);

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Ok(EnsureOutcome::Cancelled);
            }
            on_event(ConnectEvent::AttemptStarted {
                attempt,
                of: attempts,
            })
            .await;

            let result = match self.connect_locked(&mut inner, params).await {
                Ok(true) => {
                    self.verify_locked(
                        &mut inner,
                        spec,
                        policy.verify_attempts,
                        policy.settle_delay,
                        Some(cancel),
                    )
                    .await
                }
                other => other,
            };
            let verified = match result {
                Ok(verified) => verified,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "connection attempt errored");
                    inner.state = ConnectionState::Failed(e.to_string());
                    false
                }
            };

            if verified {
                on_event(ConnectEvent::Verified { attempt }).await;
                return Ok(EnsureOutcome::Connected);
            }
            if cancel.is_cancelled() {
                return Ok(EnsureOutcome::Cancelled);
            }

            let reason = match &inner.state {
                ConnectionState::Failed(reason) => reason.clone(),
                other => format!("unexpected state {other}"),
            };
            let remaining = attempts - attempt;
            on_event(ConnectEvent::AttemptFailed {
                attempt,
                remaining,
                reason,
            })
            .await;

            self.disconnect_locked(&mut inner, true).await?;

            if remaining > 0 {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(EnsureOutcome::Cancelled),
                    () = tokio::time::sleep(policy.retry_delay) => {}
                }
            }
        }

        Ok(EnsureOutcome::Exhausted { attempts })
    }

    /// Re-verify periodically in the background.
    ///
    /// Each check takes the main lock like any other caller. The latest
    /// result is published on the returned watch channel; the task stops
    /// when `cancel` fires or the receiver is dropped.
    pub fn spawn_monitor(
        self: &Arc<Self>,
        spec: VerifySpec,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (JoinHandle<()>, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let conn = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let ok = match conn.verify(&spec, 1, Duration::ZERO).await {
                            Ok(ok) => ok,
                            Err(e) => {
                                warn!(error = %e, "monitor verification failed");
                                false
                            }
                        };
                        if !ok {
                            warn!(ssid = %spec.expected_ssid, "link no longer verified");
                        }
                        if tx.send(ok).is_err() {
                            debug!("monitor receiver dropped, stopping");
                            break;
                        }
                    }
                }
            }
        });
        (handle, rx)
    }

    // ── Locked internals ─────────────────────────────────────────────

    async fn resolve_interface(
        &self,
        inner: &mut Inner,
        explicit: Option<&str>,
    ) -> Result<String, CoreError> {
        if let Some(name) = explicit {
            inner.interface = Some(name.to_owned());
            return Ok(name.to_owned());
        }
        if let Some(name) = &inner.interface {
            return Ok(name.clone());
        }

        let out = self.shell.run(&self.platform.list_interfaces()).await?;
        let name = out
            .success()
            .then(|| self.platform.parse_interfaces(&out.stdout))
            .flatten()
            .ok_or(CoreError::InterfaceNotFound)?;

        info!(interface = %name, "wireless interface found");
        inner.interface = Some(name.clone());
        Ok(name)
    }

    async fn connect_locked(
        &self,
        inner: &mut Inner,
        params: &ConnectionParams,
    ) -> Result<bool, CoreError> {
        if matches!(inner.state, ConnectionState::Failed(_)) {
            debug!("resetting after failed attempt");
            self.disconnect_locked(inner, true).await?;
        }
        inner.state = ConnectionState::Connecting;

        let interface = match self
            .resolve_interface(inner, params.interface.as_deref())
            .await
        {
            Ok(interface) => interface,
            Err(e) => {
                inner.state = ConnectionState::Failed(e.to_string());
                return Err(e);
            }
        };

        inner.session_ssid = Some(params.ssid.clone());
        let cmd = self.platform.connect(&interface, &params.ssid, &params.psk);
        let out = match self.shell.run(&cmd).await {
            Ok(out) => out,
            Err(e) => {
                inner.state = ConnectionState::Failed(e.to_string());
                return Err(e);
            }
        };

        if self.platform.connect_succeeded(&out) {
            info!(ssid = %params.ssid, %interface, "association command succeeded");
            inner.state = ConnectionState::Verifying;
            Ok(true)
        } else {
            let reason = failure_text(&out);
            warn!(ssid = %params.ssid, %interface, %reason, "association command failed");
            inner.state = ConnectionState::Failed(reason);
            Ok(false)
        }
    }

    async fn verify_locked(
        &self,
        inner: &mut Inner,
        spec: &VerifySpec,
        max_attempts: u32,
        settle_delay: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool, CoreError> {
        let interface = self.resolve_interface(inner, None).await?;
        let max_attempts = max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if let Some(cancel) = cancel {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(false),
                    () = tokio::time::sleep(settle_delay) => {}
                }
            } else {
                tokio::time::sleep(settle_delay).await;
            }

            if self.check_once(&interface, spec).await? {
                if inner.state == ConnectionState::Verifying {
                    inner.state = ConnectionState::Connected;
                }
                info!(ssid = %spec.expected_ssid, attempt, "connection verified");
                return Ok(true);
            }
            debug!(attempt, max_attempts, "verification attempt failed");
        }

        if matches!(
            inner.state,
            ConnectionState::Verifying | ConnectionState::Connected
        ) {
            inner.state = ConnectionState::Failed(format!(
                "could not verify {} after {max_attempts} attempts",
                spec.expected_ssid
            ));
        }
        Ok(false)
    }

    /// One verification pass: identity, address in subnet, gateway ping.
    async fn check_once(&self, interface: &str, spec: &VerifySpec) -> Result<bool, CoreError> {
        let identity = self.identity_on(interface).await?;

        if let Some(id) = &identity {
            if id.ssid != spec.expected_ssid {
                warn!(expected = %spec.expected_ssid, actual = %id.ssid, "associated with the wrong network");
                return Ok(false);
            }
            if let (Some(expected), Some(actual)) = (&spec.expected_bssid, &id.bssid) {
                if !expected.eq_ignore_ascii_case(actual) {
                    warn!(%expected, %actual, "BSSID mismatch");
                    return Ok(false);
                }
            }
        }

        let addr_out = self
            .shell
            .run(&self.platform.interface_address(interface))
            .await?;
        let address = addr_out
            .success()
            .then(|| self.platform.parse_address(&addr_out.stdout))
            .flatten();
        let in_subnet = address.is_some_and(|a| spec.subnet.contains(a));
        if !in_subnet {
            debug!(?address, subnet = %spec.subnet, "interface address not in expected subnet");
            return Ok(false);
        }

        let ping = self.shell.run(&self.platform.ping(spec.gateway)).await?;
        if !ping.success() {
            debug!(gateway = %spec.gateway, "gateway did not answer");
            return Ok(false);
        }

        let bssid_unread = spec.expected_bssid.is_some()
            && identity.as_ref().is_some_and(|id| id.bssid.is_none());
        if identity.is_some() && !bssid_unread {
            return Ok(true);
        }
        if spec.allow_unreadable_ssid {
            warn!(
                ssid = %spec.expected_ssid,
                "network identity unreadable, accepting on subnet and gateway checks alone"
            );
            Ok(true)
        } else {
            debug!("network identity unreadable and relaxation disabled");
            Ok(false)
        }
    }

    async fn identity_on(&self, interface: &str) -> Result<Option<NetworkIdentity>, CoreError> {
        for probe in self.platform.identity_probes(interface) {
            let out = match self.shell.run(&probe.command).await {
                Ok(out) => out,
                Err(CoreError::CommandUnavailable { program, .. }) => {
                    debug!(%program, "identity probe unavailable, trying next");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !out.success() {
                continue;
            }
            if let Some(identity) = probe.parse(&out.stdout) {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    async fn disconnect_locked(&self, inner: &mut Inner, forget: bool) -> Result<bool, CoreError> {
        inner.state = ConnectionState::Disconnecting;
        let result = self.teardown(inner, forget).await;
        inner.state = ConnectionState::Disconnected;
        inner.session_ssid = None;
        result
    }

    async fn teardown(&self, inner: &mut Inner, forget: bool) -> Result<bool, CoreError> {
        let interface = match self.resolve_interface(inner, None).await {
            Ok(interface) => interface,
            Err(CoreError::InterfaceNotFound) => {
                warn!("no wireless interface, nothing to disconnect");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let mut clean = true;
        if forget {
            if let Some(ssid) = inner.session_ssid.clone() {
                let out = self
                    .shell
                    .run(&self.platform.forget(&interface, &ssid))
                    .await?;
                if !out.success() {
                    warn!(%ssid, reason = %failure_text(&out), "could not forget network");
                    clean = false;
                }
            }
        }

        for on in [false, true] {
            let out = self
                .shell
                .run(&self.platform.radio_power(&interface, on))
                .await?;
            if !out.success() {
                warn!(%interface, on, reason = %failure_text(&out), "radio power change failed");
                clean = false;
            }
        }

        info!(%interface, clean, "wireless interface power-cycled");
        Ok(clean)
    }
}

fn failure_text(out: &CommandOutput) -> String {
    let text = if out.stderr.trim().is_empty() {
        out.stdout.trim()
    } else {
        out.stderr.trim()
    };
    if text.is_empty() {
        format!("exit code {}", out.exit_code)
    } else {
        text.to_owned()
    }
}
