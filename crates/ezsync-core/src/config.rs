// ── Runtime session configuration ──
//
// These types describe *what* to sync and *which* network to join. They
// never touch disk: the shell builds them (usually via ezsync-config) and
// hands them to `SyncSession::start`.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Address block the card's access point hands out.
pub const DEVICE_SUBNET: Ipv4Subnet = Ipv4Subnet {
    network: Ipv4Addr::new(192, 168, 4, 0),
    prefix_len: 24,
};

/// The card's own address on its network.
pub const DEVICE_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

// ── Connection parameters ────────────────────────────────────────────

/// Network to associate with for one session.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub ssid: String,
    pub psk: SecretString,
    /// Wireless interface to use. `None` means discover it.
    pub interface: Option<String>,
}

// ── Ipv4Subnet ───────────────────────────────────────────────────────

/// An IPv4 prefix such as `192.168.4.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Subnet {
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, CoreError> {
        if prefix_len > 32 {
            return Err(CoreError::Config {
                message: format!("invalid prefix length /{prefix_len}"),
            });
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    fn mask(self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    pub fn contains(self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(addr) & mask == u32::from(self.network) & mask
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Config {
            message: format!("invalid subnet '{s}', expected a.b.c.d/len"),
        };
        let (addr, len) = s.trim().split_once('/').ok_or_else(invalid)?;
        let network = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix_len = len.parse::<u8>().map_err(|_| invalid())?;
        Self::new(network, prefix_len)
    }
}

// ── VerifySpec ───────────────────────────────────────────────────────

/// What a verified association must look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySpec {
    pub expected_ssid: String,
    /// Compared case-insensitively when set.
    pub expected_bssid: Option<String>,
    pub subnet: Ipv4Subnet,
    pub gateway: Ipv4Addr,
    /// Accept an attempt whose SSID cannot be read when the subnet check
    /// and gateway ping both pass. Some macOS releases redact the SSID
    /// from every introspection tool without location permission.
    pub allow_unreadable_ssid: bool,
}

impl VerifySpec {
    pub fn new(
        expected_ssid: impl Into<String>,
        expected_bssid: Option<String>,
        subnet: Ipv4Subnet,
        gateway: Ipv4Addr,
        allow_unreadable_ssid: bool,
    ) -> Result<Self, CoreError> {
        if !subnet.contains(gateway) {
            return Err(CoreError::Config {
                message: format!("gateway {gateway} is outside subnet {subnet}"),
            });
        }
        Ok(Self {
            expected_ssid: expected_ssid.into(),
            expected_bssid,
            subnet,
            gateway,
            allow_unreadable_ssid,
        })
    }

    /// Defaults for an ez Share card broadcasting `ssid`.
    pub fn for_device(ssid: impl Into<String>) -> Self {
        Self {
            expected_ssid: ssid.into(),
            expected_bssid: None,
            subnet: DEVICE_SUBNET,
            gateway: DEVICE_GATEWAY,
            allow_unreadable_ssid: true,
        }
    }
}

// ── SyncParams ───────────────────────────────────────────────────────

/// Parameters for one sync session.
#[derive(Debug, Clone)]
pub struct SyncParams {
    /// Local mirror root. Must already be `~`-expanded.
    pub local_root: PathBuf,
    /// Listing page of the remote root, e.g. `http://192.168.4.1/dir?dir=A:`.
    pub remote_root: Url,
    pub overwrite: bool,
    pub keep_old: bool,
    /// Extra display names to skip, on top of the built-in ones.
    pub ignore_names: BTreeSet<String>,
    /// Connect attempts before giving up.
    pub retries: u32,
    /// Fixed delay between connect attempts.
    pub connection_delay: Duration,
    /// Verification attempts per connect attempt.
    pub verify_attempts: u32,
    /// Wait before each verification attempt.
    pub settle_delay: Duration,
}

impl SyncParams {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: Url) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root,
            overwrite: false,
            keep_old: false,
            ignore_names: BTreeSet::new(),
            retries: 3,
            connection_delay: Duration::from_secs(5),
            verify_attempts: 5,
            settle_delay: Duration::from_secs(2),
        }
    }

    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy {
            overwrite: self.overwrite,
            keep_old: self.keep_old,
        }
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.local_root.as_os_str().is_empty() {
            return Err(CoreError::Config {
                message: "local path is empty".into(),
            });
        }
        if !matches!(self.remote_root.scheme(), "http" | "https") {
            return Err(CoreError::Config {
                message: format!(
                    "remote URL must be http(s), got '{}'",
                    self.remote_root.scheme()
                ),
            });
        }
        if self.remote_root.host().is_none() {
            return Err(CoreError::Config {
                message: format!("remote URL '{}' has no host", self.remote_root),
            });
        }
        if self.retries == 0 {
            return Err(CoreError::Config {
                message: "retries must be at least 1".into(),
            });
        }
        if self.verify_attempts == 0 {
            return Err(CoreError::Config {
                message: "verify attempts must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Inputs to the per-file download decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub overwrite: bool,
    pub keep_old: bool,
}
