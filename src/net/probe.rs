//! Device probe utilities: reachability checks and ARP-table enumeration
//!
//! Both probes are best-effort and scoped to the local subnet. Devices with
//! no ARP entry are invisible to discovery; that is a documented non-goal.
//! Raw-socket ICMP would need elevated privileges, so reachability shells
//! out to the system `ping` and neighbor enumeration to `arp -a`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// A device found in the host's neighbor-resolution table.
/// Produced transiently per scan; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub is_reachable: bool,
}

/// Probe-layer failures. Always absorbed to an empty/false result before
/// leaving this module; discovery must never crash the caller.
#[derive(Debug, Error)]
enum ProbeError {
    #[error("probe command failed to run: {0}")]
    Io(#[from] std::io::Error),
    #[error("probe command produced non-UTF-8 output")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("`{0}` exited with status {1}")]
    CommandFailed(&'static str, std::process::ExitStatus),
}

/// Issue a single ICMP echo probe. Returns false on any timeout, refusal,
/// or host-unreachable condition; never errors to the caller.
pub async fn check_reachable(ip: &str, timeout: Duration) -> bool {
    let timeout_secs = timeout.as_secs().max(1).to_string();

    let mut cmd = Command::new("ping");
    #[cfg(target_os = "macos")]
    cmd.args(["-c", "1", "-t", &timeout_secs, ip]);
    #[cfg(not(target_os = "macos"))]
    cmd.args(["-c", "1", "-W", &timeout_secs, ip]);

    cmd.stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

    // Outer timeout guards against ping implementations that ignore the flag
    let result = tokio::time::timeout(timeout + Duration::from_millis(500), cmd.status()).await;

    match result {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            warn!("ping probe for {} failed to spawn: {}", ip, e);
            false
        }
        Err(_) => {
            trace!("ping probe for {} timed out after {:?}", ip, timeout);
            false
        }
    }
}

/// Enumerate the host's ARP table. Malformed lines are silently skipped;
/// any failure to run or read `arp` degrades to an empty list.
pub async fn list_known_devices() -> Vec<NetworkDevice> {
    match read_neighbor_table().await {
        Ok(devices) => {
            debug!("ARP table listed {} device(s)", devices.len());
            devices
        }
        Err(e) => {
            warn!("neighbor-table probe failed, returning no devices: {}", e);
            Vec::new()
        }
    }
}

async fn read_neighbor_table() -> Result<Vec<NetworkDevice>, ProbeError> {
    let output = Command::new("arp").arg("-a").kill_on_drop(true).output().await?;

    if !output.status.success() {
        return Err(ProbeError::CommandFailed("arp -a", output.status));
    }

    let stdout = String::from_utf8(output.stdout)?;
    Ok(stdout.lines().filter_map(parse_arp_line).collect())
}

/// `hostname (ip) at macAddress ...` as printed by `arp -a` on both BSD and
/// Linux. Incomplete entries keep their IP but are marked unreachable.
static ARP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // pattern is a compile-time constant
    Regex::new(
        r"^(?P<host>\S+)\s+\((?P<ip>\d{1,3}(?:\.\d{1,3}){3})\)\s+at\s+(?P<mac>[0-9a-fA-F]{1,2}(?::[0-9a-fA-F]{1,2}){5}|\(incomplete\)|<incomplete>)",
    )
    .expect("ARP line regex must compile")
});

fn parse_arp_line(line: &str) -> Option<NetworkDevice> {
    let caps = ARP_LINE.captures(line.trim())?;

    let hostname = match &caps["host"] {
        "?" => None,
        name => Some(name.to_string()),
    };

    let mac = &caps["mac"];
    let incomplete = mac == "(incomplete)" || mac == "<incomplete>";

    Some(NetworkDevice {
        ip: caps["ip"].to_string(),
        hostname,
        mac_address: if incomplete {
            None
        } else {
            Some(mac.to_string())
        },
        is_reachable: !incomplete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bsd_line() {
        let line = "avr (192.168.50.99) at 0:5:cd:7d:d8:a6 on en0 ifscope [ethernet]";
        let device = parse_arp_line(line).unwrap();

        assert_eq!(device.ip, "192.168.50.99");
        assert_eq!(device.hostname.as_deref(), Some("avr"));
        assert_eq!(device.mac_address.as_deref(), Some("0:5:cd:7d:d8:a6"));
        assert!(device.is_reachable);
    }

    #[test]
    fn test_parse_linux_line() {
        let line = "router.lan (192.168.1.1) at aa:bb:cc:dd:ee:ff [ether] on eth0";
        let device = parse_arp_line(line).unwrap();

        assert_eq!(device.ip, "192.168.1.1");
        assert_eq!(device.hostname.as_deref(), Some("router.lan"));
        assert_eq!(device.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert!(device.is_reachable);
    }

    #[test]
    fn test_parse_incomplete_entry() {
        let bsd = "? (192.168.1.37) at (incomplete) on en0 ifscope [ethernet]";
        let device = parse_arp_line(bsd).unwrap();
        assert_eq!(device.ip, "192.168.1.37");
        assert_eq!(device.hostname, None);
        assert_eq!(device.mac_address, None);
        assert!(!device.is_reachable);

        let linux = "? (10.0.0.9) at <incomplete> on eth0";
        let device = parse_arp_line(linux).unwrap();
        assert!(!device.is_reachable);
        assert_eq!(device.mac_address, None);
    }

    #[test]
    fn test_unknown_hostname_maps_to_none() {
        let line = "? (192.168.1.23) at 11:22:33:44:55:66 on en0 ifscope [ethernet]";
        let device = parse_arp_line(line).unwrap();
        assert_eq!(device.hostname, None);
        assert!(device.is_reachable);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        assert!(parse_arp_line("").is_none());
        assert!(parse_arp_line("garbage output").is_none());
        assert!(parse_arp_line("host (not-an-ip) at aa:bb:cc:dd:ee:ff").is_none());
        assert!(parse_arp_line("(192.168.1.1) at aa:bb:cc:dd:ee:ff").is_none());
    }
}
