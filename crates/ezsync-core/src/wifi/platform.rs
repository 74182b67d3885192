// ── Platform command sets ──
//
// Builders for the OS commands that drive the wireless interface, and
// parsers for their human-readable output. macOS goes through
// `networksetup` / `ipconfig`; Linux through NetworkManager's `nmcli`,
// `iwgetid` and `ip`. Nothing here runs a process.

use std::net::Ipv4Addr;

use secrecy::SecretString;

use crate::shell::{CommandOutput, ShellCommand};

/// The SSID and (when readable) BSSID of the current association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub ssid: String,
    pub bssid: Option<String>,
}

/// One way of reading the current network identity.
#[derive(Debug, Clone)]
pub struct IdentityProbe {
    pub command: ShellCommand,
    parse: fn(&str) -> Option<NetworkIdentity>,
}

impl IdentityProbe {
    /// Interpret the probe's stdout. `None` means "could not tell".
    pub fn parse(&self, stdout: &str) -> Option<NetworkIdentity> {
        (self.parse)(stdout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
}

impl Platform {
    /// The command set for the host we were compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    // ── Interface discovery ──────────────────────────────────────────

    pub fn list_interfaces(self) -> ShellCommand {
        match self {
            Self::MacOs => ShellCommand::new("networksetup").arg("-listallhardwareports"),
            Self::Linux => ShellCommand::new("nmcli").args(["-t", "-f", "DEVICE,TYPE", "device"]),
        }
    }

    pub fn parse_interfaces(self, stdout: &str) -> Option<String> {
        match self {
            Self::MacOs => parse_hardware_ports(stdout),
            Self::Linux => stdout.lines().find_map(|line| {
                let (device, kind) = line.trim().rsplit_once(':')?;
                (kind == "wifi" && !device.is_empty()).then(|| device.to_owned())
            }),
        }
    }

    // ── Association ──────────────────────────────────────────────────

    pub fn connect(self, interface: &str, ssid: &str, psk: &SecretString) -> ShellCommand {
        match self {
            Self::MacOs => ShellCommand::new("networksetup")
                .args(["-setairportnetwork", interface, ssid])
                .secret_arg(psk),
            Self::Linux => ShellCommand::new("nmcli")
                .args(["device", "wifi", "connect", ssid, "password"])
                .secret_arg(psk)
                .args(["ifname", interface]),
        }
    }

    /// Whether an association command actually succeeded.
    ///
    /// `networksetup` exits 0 on failure and reports it on stdout.
    pub fn connect_succeeded(self, output: &CommandOutput) -> bool {
        if !output.success() {
            return false;
        }
        match self {
            Self::MacOs => {
                let out = output.stdout.to_lowercase();
                !(out.contains("failed") || out.contains("could not") || out.contains("error"))
            }
            Self::Linux => !output.stdout.to_lowercase().starts_with("error"),
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// Identity probes in the order they should be tried.
    pub fn identity_probes(self, interface: &str) -> Vec<IdentityProbe> {
        match self {
            Self::MacOs => vec![
                IdentityProbe {
                    command: ShellCommand::new("networksetup")
                        .args(["-getairportnetwork", interface]),
                    parse: parse_airport_network,
                },
                IdentityProbe {
                    command: ShellCommand::new("ipconfig").args(["getsummary", interface]),
                    parse: parse_ipconfig_summary,
                },
            ],
            Self::Linux => vec![
                IdentityProbe {
                    command: ShellCommand::new("nmcli").args([
                        "-t",
                        "-f",
                        "ACTIVE,SSID,BSSID",
                        "device",
                        "wifi",
                        "list",
                        "ifname",
                        interface,
                    ]),
                    parse: parse_nmcli_wifi_list,
                },
                IdentityProbe {
                    command: ShellCommand::new("iwgetid").args([interface, "-r"]),
                    parse: parse_iwgetid,
                },
            ],
        }
    }

    // ── Addressing / reachability ────────────────────────────────────

    pub fn interface_address(self, interface: &str) -> ShellCommand {
        match self {
            Self::MacOs => ShellCommand::new("ipconfig").args(["getifaddr", interface]),
            Self::Linux => ShellCommand::new("ip").args(["-4", "-o", "addr", "show", "dev", interface]),
        }
    }

    pub fn parse_address(self, stdout: &str) -> Option<Ipv4Addr> {
        match self {
            Self::MacOs => stdout.trim().parse().ok(),
            Self::Linux => stdout.lines().find_map(|line| {
                let mut fields = line.split_whitespace();
                fields.find(|f| *f == "inet")?;
                let cidr = fields.next()?;
                cidr.split('/').next()?.parse().ok()
            }),
        }
    }

    pub fn ping(self, gateway: Ipv4Addr) -> ShellCommand {
        let target = gateway.to_string();
        match self {
            Self::MacOs => ShellCommand::new("ping").args(["-c", "2", "-t", "3", &target]),
            Self::Linux => ShellCommand::new("ping").args(["-c", "2", "-W", "2", &target]),
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Remove `ssid` from the remembered networks.
    pub fn forget(self, interface: &str, ssid: &str) -> ShellCommand {
        match self {
            Self::MacOs => ShellCommand::new("networksetup")
                .args(["-removepreferredwirelessnetwork", interface, ssid]),
            Self::Linux => ShellCommand::new("nmcli").args(["connection", "delete", "id", ssid]),
        }
    }

    pub fn radio_power(self, interface: &str, on: bool) -> ShellCommand {
        let state = if on { "on" } else { "off" };
        match self {
            Self::MacOs => {
                ShellCommand::new("networksetup").args(["-setairportpower", interface, state])
            }
            Self::Linux => ShellCommand::new("nmcli").args(["radio", "wifi", state]),
        }
    }
}

// ── Output parsers ───────────────────────────────────────────────────

fn parse_hardware_ports(stdout: &str) -> Option<String> {
    let mut lines = stdout.lines().map(str::trim);
    while let Some(line) = lines.next() {
        let Some(port) = line.strip_prefix("Hardware Port:") else {
            continue;
        };
        if matches!(port.trim(), "Wi-Fi" | "AirPort") {
            let device = lines.next()?.strip_prefix("Device:")?.trim();
            return (!device.is_empty()).then(|| device.to_owned());
        }
    }
    None
}

fn parse_airport_network(stdout: &str) -> Option<NetworkIdentity> {
    let ssid = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("Current Wi-Fi Network:"))?
        .trim();
    readable_ssid(ssid).map(|ssid| NetworkIdentity { ssid, bssid: None })
}

fn parse_ipconfig_summary(stdout: &str) -> Option<NetworkIdentity> {
    let field = |name: &str| {
        stdout.lines().find_map(|l| {
            let (key, value) = l.split_once(" : ")?;
            (key.trim() == name).then(|| value.trim().to_owned())
        })
    };
    let ssid = readable_ssid(&field("SSID")?)?;
    let bssid = field("BSSID").filter(|b| !b.is_empty() && !b.contains("redacted"));
    Some(NetworkIdentity { ssid, bssid })
}

fn parse_nmcli_wifi_list(stdout: &str) -> Option<NetworkIdentity> {
    stdout.lines().find_map(|line| {
        let fields = split_terse(line);
        match fields.as_slice() {
            [active, ssid, rest @ ..] if active == "yes" => {
                let ssid = readable_ssid(ssid)?;
                let bssid = rest.first().filter(|b| !b.is_empty()).cloned();
                Some(NetworkIdentity { ssid, bssid })
            }
            _ => None,
        }
    })
}

fn parse_iwgetid(stdout: &str) -> Option<NetworkIdentity> {
    readable_ssid(stdout.trim()).map(|ssid| NetworkIdentity { ssid, bssid: None })
}

fn readable_ssid(ssid: &str) -> Option<String> {
    let ssid = ssid.trim();
    (!ssid.is_empty() && ssid != "<redacted>").then(|| ssid.to_owned())
}

/// Split one line of `nmcli -t` output, honouring `\:` escapes.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.trim_end().chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let (Some(next), Some(field)) = (chars.next(), fields.last_mut()) {
                    field.push(next);
                }
            }
            ':' => fields.push(String::new()),
            c => {
                if let Some(field) = fields.last_mut() {
                    field.push(c);
                }
            }
        }
    }
    fields
}
