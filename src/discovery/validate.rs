//! Candidate validation via lightweight protocol handshakes
//!
//! A scored candidate is promoted to a usable endpoint only after the device
//! actually answers a class-specific status query. Handshake timeouts are
//! intentionally shorter than the session's steady-state timeouts because
//! validation runs during interactive discovery.
//!
//! Validations for independent candidates run concurrently (`join_all`) and
//! share no mutable state; `join_all` also preserves the input confidence
//! ordering in the output.

use crate::config::DiscoveryConfig;
use crate::discovery::rules::Candidate;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Telnet control port used by Denon/Marantz receivers.
pub const AVR_TELNET_PORT: u16 = 23;
/// HTTPS API port used by SmartCast TVs.
pub const TV_API_PORT: u16 = 7345;

/// Identifying metadata extracted during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

/// A candidate confirmed via an actual protocol handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedEndpoint {
    pub ip: String,
    pub port: u16,
    pub response_time_ms: u64,
    pub auth_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
}

fn device_info_for(candidate: &Candidate) -> Option<DeviceInfo> {
    if candidate.device.hostname.is_none() && candidate.brand.is_none() {
        return None;
    }
    Some(DeviceInfo {
        name: candidate.device.hostname.clone(),
        brand: candidate.brand.clone(),
    })
}

/// Confirm AVR candidates with a single telnet status query (`PW?`).
/// Failed handshakes are dropped; only confirmed endpoints come back.
pub async fn validate_avr_candidates(
    candidates: &[Candidate],
    cfg: &DiscoveryConfig,
) -> Vec<ValidatedEndpoint> {
    let timeout = Duration::from_millis(cfg.validate_timeout_ms);
    let checks = candidates.iter().map(|c| validate_avr(c, timeout));
    join_all(checks).await.into_iter().flatten().collect()
}

async fn validate_avr(candidate: &Candidate, timeout: Duration) -> Option<ValidatedEndpoint> {
    let ip = candidate.device.ip.clone();
    let start = Instant::now();

    match tokio::time::timeout(timeout, avr_handshake(&ip, AVR_TELNET_PORT)).await {
        Ok(Ok(())) => {
            let rtt = start.elapsed().as_millis() as u64;
            debug!("AVR handshake with {} confirmed in {}ms", ip, rtt);
            Some(ValidatedEndpoint {
                ip,
                port: AVR_TELNET_PORT,
                response_time_ms: rtt,
                // The vendor telnet protocol is plaintext and unauthenticated
                auth_required: false,
                device_info: device_info_for(candidate),
            })
        }
        Ok(Err(e)) => {
            debug!("AVR handshake with {} failed: {}", ip, e);
            None
        }
        Err(_) => {
            debug!("AVR handshake with {} timed out after {:?}", ip, timeout);
            None
        }
    }
}

async fn avr_handshake(ip: &str, port: u16) -> Result<()> {
    let mut stream = TcpStream::connect((ip, port)).await?;
    stream.write_all(b"PW?\r").await?;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(anyhow!("connection closed before a power status reply"));
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if text
            .split(['\r', '\n'])
            .any(|line| line.starts_with("PW"))
        {
            return Ok(());
        }
    }
}

/// Confirm TV candidates with one SmartCast status request. TVs answer over
/// HTTPS with a self-signed certificate; any well-formed response confirms
/// the device class, and an auth challenge marks the endpoint as requiring
/// pairing before control.
pub async fn validate_tv_candidates(
    candidates: &[Candidate],
    cfg: &DiscoveryConfig,
) -> Vec<ValidatedEndpoint> {
    let timeout = Duration::from_millis(cfg.validate_timeout_ms);

    let client = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("TV validation client could not be built: {}", e);
            return Vec::new();
        }
    };

    let checks = candidates.iter().map(|c| validate_tv(&client, c));
    join_all(checks).await.into_iter().flatten().collect()
}

async fn validate_tv(client: &reqwest::Client, candidate: &Candidate) -> Option<ValidatedEndpoint> {
    let ip = candidate.device.ip.clone();
    let url = format!("https://{}:{}/state/device/power_mode", ip, TV_API_PORT);
    let start = Instant::now();

    match client.get(&url).send().await {
        Ok(response) => {
            let rtt = start.elapsed().as_millis() as u64;
            let status = response.status();
            let auth_required = status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
                || pairing_required(&response.json().await.unwrap_or(serde_json::Value::Null));
            debug!(
                "TV handshake with {} confirmed in {}ms (auth_required={})",
                ip, rtt, auth_required
            );
            Some(ValidatedEndpoint {
                ip,
                port: TV_API_PORT,
                response_time_ms: rtt,
                auth_required,
                device_info: device_info_for(candidate),
            })
        }
        Err(e) => {
            debug!("TV handshake with {} failed: {}", ip, e);
            None
        }
    }
}

/// SmartCast reports auth problems inside the STATUS envelope rather than
/// via HTTP status codes on some firmware versions.
fn pairing_required(body: &serde_json::Value) -> bool {
    body.get("STATUS")
        .and_then(|s| s.get("RESULT"))
        .and_then(|r| r.as_str())
        .is_some_and(|result| {
            let result = result.to_ascii_uppercase();
            result == "REQUIRES_PAIRING" || result == "BLOCKED"
        })
}
