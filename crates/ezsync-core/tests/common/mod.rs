#![allow(dead_code, clippy::unwrap_used)]
// Shared fixtures: a scripted Linux host behind `ShellExec`, recording
// ports, and a wiremock stand-in for the card's web server.

use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ezsync_api::{RetryPolicy, TransportConfig};
use ezsync_core::{
    CommandOutput, ConnectionParams, CoreError, ProgressPort, ProgressValue, Severity, ShellCommand,
    ShellExec, StatusPort, SyncParams,
};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

pub const SSID: &str = "ez Share";

// ── Fake host ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct HostState {
    /// Wireless device name, `None` for a host without Wi-Fi.
    pub interface: Option<String>,
    /// SSID currently associated.
    pub associated: Option<String>,
    /// Where association actually lands, if not the requested network.
    pub lands_on: Option<String>,
    pub address: Ipv4Addr,
    /// Association commands that fail before one succeeds.
    pub connect_failures: u32,
    pub ssid_unreadable: bool,
    pub gateway_reachable: bool,
    /// `ping` invocations that error out (as a timed-out command would).
    pub ping_errors: u32,
    /// `ping` panics, taking down whatever task runs it.
    pub ping_panics: bool,
    pub log: Vec<String>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            interface: Some("wlan0".into()),
            associated: None,
            lands_on: None,
            address: Ipv4Addr::new(192, 168, 4, 2),
            connect_failures: 0,
            ssid_unreadable: false,
            gateway_reachable: true,
            ping_errors: 0,
            ping_panics: false,
            log: Vec::new(),
        }
    }
}

/// A Linux host whose `nmcli` / `ip` / `ping` behave like the real tools.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn with(f: impl FnOnce(&mut HostState)) -> Self {
        let host = Self::default();
        f(&mut host.state.lock().unwrap());
        host
    }

    pub fn update(&self, f: impl FnOnce(&mut HostState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn ran(&self, prefix: &str) -> usize {
        self.log().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn associated(&self) -> Option<String> {
        self.state.lock().unwrap().associated.clone()
    }
}

fn exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

impl ShellExec for FakeHost {
    async fn run(&self, cmd: &ShellCommand) -> Result<CommandOutput, CoreError> {
        let mut st = self.state.lock().unwrap();
        st.log.push(cmd.to_string());
        let argv = cmd.argv();

        let out = match (cmd.program(), argv.as_slice()) {
            ("nmcli", ["-t", "-f", "DEVICE,TYPE", "device"]) => match &st.interface {
                Some(iface) => exit(0, format!("lo:loopback\n{iface}:wifi\n"), ""),
                None => exit(0, "lo:loopback\neth0:ethernet\n", ""),
            },
            ("nmcli", ["device", "wifi", "connect", ssid, "password", _, "ifname", _]) => {
                if st.connect_failures > 0 {
                    st.connect_failures -= 1;
                    exit(10, "", format!("Error: No network with SSID '{ssid}' found."))
                } else {
                    st.associated = Some(st.lands_on.clone().unwrap_or_else(|| (*ssid).to_owned()));
                    exit(0, "Device 'wlan0' successfully activated.", "")
                }
            }
            ("nmcli", ["-t", "-f", "ACTIVE,SSID,BSSID", ..]) => {
                match (&st.associated, st.ssid_unreadable) {
                    (Some(ssid), false) => exit(0, format!("yes:{ssid}:9C\\:B7\\:0D\\:00\\:00\\:01\n"), ""),
                    _ => exit(0, "", ""),
                }
            }
            ("iwgetid", _) => match (&st.associated, st.ssid_unreadable) {
                (Some(ssid), false) => exit(0, format!("{ssid}\n"), ""),
                _ => exit(255, "", ""),
            },
            ("ip", _) => match &st.associated {
                Some(_) => exit(
                    0,
                    format!(
                        "3: wlan0    inet {}/24 brd 192.168.4.255 scope global dynamic wlan0\n",
                        st.address
                    ),
                    "",
                ),
                None => exit(0, "", ""),
            },
            ("ping", _) if st.ping_panics => {
                drop(st);
                panic!("scripted ping panic");
            }
            ("ping", _) if st.ping_errors > 0 => {
                st.ping_errors -= 1;
                return Err(CoreError::Internal("ping: timed out after 5s".into()));
            }
            ("ping", _) => {
                if st.associated.is_some() && st.gateway_reachable {
                    exit(0, "2 packets transmitted, 2 received", "")
                } else {
                    exit(1, "2 packets transmitted, 0 received", "")
                }
            }
            ("nmcli", ["connection", "delete", ..]) => exit(0, "", ""),
            ("nmcli", ["radio", "wifi", "off"]) => {
                st.associated = None;
                exit(0, "", "")
            }
            ("nmcli", ["radio", "wifi", "on"]) => exit(0, "", ""),
            (program, _) => {
                return Err(CoreError::CommandUnavailable {
                    program: program.to_owned(),
                    reason: "not scripted".into(),
                });
            }
        };
        Ok(out)
    }
}

// ── Recording ports ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Recorder {
    pub statuses: Mutex<Vec<(String, Severity)>>,
    pub progress: Mutex<Vec<ProgressValue>>,
}

impl Recorder {
    pub fn statuses(&self) -> Vec<(String, Severity)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn has_status(&self, needle: &str) -> bool {
        self.statuses().iter().any(|(m, _)| m.contains(needle))
    }

    pub fn progress(&self) -> Vec<ProgressValue> {
        self.progress.lock().unwrap().clone()
    }
}

impl StatusPort for Recorder {
    fn on_status(&self, message: &str, severity: Severity) {
        self.statuses
            .lock()
            .unwrap()
            .push((message.to_owned(), severity));
    }
}

impl ProgressPort for Recorder {
    fn on_progress(&self, value: ProgressValue) {
        self.progress.lock().unwrap().push(value);
    }
}

// ── Parameters ──────────────────────────────────────────────────────

pub fn fast_transport() -> TransportConfig {
    TransportConfig {
        timeout: Duration::from_secs(2),
        chunk_timeout: Duration::from_secs(2),
        retry: RetryPolicy::none(),
    }
}

pub fn connection_params() -> ConnectionParams {
    ConnectionParams {
        ssid: SSID.into(),
        psk: "88888888".to_string().into(),
        interface: None,
    }
}

pub fn fast_sync_params(local_root: &Path, server: &MockServer) -> SyncParams {
    let mut params = SyncParams::new(local_root, root_url(server));
    params.retries = 2;
    params.verify_attempts = 2;
    params.settle_delay = Duration::ZERO;
    params.connection_delay = Duration::from_millis(10);
    params
}

// ── Card server ─────────────────────────────────────────────────────

pub fn root_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/dir?dir=A:", server.uri())).unwrap()
}

/// A listing line for a file, in the card's padded timestamp format.
pub fn file_line(name: &str, dir: &str, stamp: &str) -> String {
    format!(
        "{stamp}         1KB   <a href=\"download?file={name}&amp;dir={dir}\"> {name}</a>\n"
    )
}

pub fn dir_line(name: &str, href_dir: &str) -> String {
    format!("2024- 2- 1   9: 0: 0   &lt;DIR&gt;   <a href=\"dir?dir={href_dir}\"> {name}</a>\n")
}

pub fn page(lines: &[String]) -> String {
    format!(
        "<html><body><h1>A:</h1><pre>\n\
         2024- 2- 1   9: 0: 0   &lt;DIR&gt;   <a href=\"dir?dir=A:\">.</a>\n\
         2024- 2- 1   9: 0: 0   &lt;DIR&gt;   <a href=\"dir?dir=A:\">..</a>\n\
         {}</pre></body></html>",
        lines.concat()
    )
}

pub async fn mount_dir(server: &MockServer, dir: &str, html: String, expect: impl Into<Times>) {
    Mock::given(method("GET"))
        .and(path("/dir"))
        .and(query_param("dir", dir))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(expect)
        .mount(server)
        .await;
}

pub async fn mount_file(server: &MockServer, name: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path("/download"))
        .and(query_param("file", name))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Root with `file1.txt`, and `B/` holding `file2.txt`.
pub const STAMP_1: &str = "2023- 3- 4  10: 5: 6";
pub const STAMP_2: &str = "2023-11-20  22:15:09";

pub fn root_page() -> String {
    page(&[
        file_line("file1.txt", "A:", STAMP_1),
        dir_line("B", "A:%5CB"),
    ])
}

pub fn b_page() -> String {
    page(&[file_line("file2.txt", "A:%5CB", STAMP_2)])
}

/// The remote epoch timestamp for a listing stamp.
pub fn remote_ts(stamp: &str) -> i64 {
    ezsync_api::listing::parse_timestamp(stamp).unwrap()
}

/// Local mtime in whole seconds.
pub fn mtime(path: &Path) -> i64 {
    let meta = std::fs::metadata(path).unwrap();
    filetime::FileTime::from_last_modification_time(&meta).unix_seconds()
}

/// Files left behind by interrupted downloads.
pub fn part_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".part"))
        .collect()
}
