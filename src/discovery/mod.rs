//! Network discovery pipeline: enumerate -> score -> rank -> validate
//!
//! Discovery is best-effort by contract. Every failure in the probe layer
//! degrades to an empty result list; nothing here may crash or block the
//! caller that triggered a scan.

pub mod rules;
pub mod validate;

pub use rules::{Candidate, DeviceClass};
pub use validate::{DeviceInfo, ValidatedEndpoint};

use crate::config::DiscoveryConfig;
use crate::net::{self, NetworkDevice};
use tracing::{debug, info};

/// Score and rank a device list for the target class. Pure: no I/O.
/// Output is sorted by confidence descending; ties keep enumeration order
/// (stable sort).
pub fn rank_candidates(
    devices: &[NetworkDevice],
    class: DeviceClass,
    cfg: &DiscoveryConfig,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = devices
        .iter()
        .filter_map(|d| rules::score_device(d, class, cfg))
        .collect();

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates
}

/// Run one scan for the target class: list the ARP table once, score every
/// device, return the ranked, thresholded candidates.
pub async fn scan_for_candidates(class: DeviceClass, cfg: &DiscoveryConfig) -> Vec<Candidate> {
    let devices = net::list_known_devices().await;
    let candidates = rank_candidates(&devices, class, cfg);

    info!(
        "{} scan: {} device(s) in the neighbor table, {} candidate(s) above threshold",
        class.as_str(),
        devices.len(),
        candidates.len()
    );
    for candidate in candidates.iter().take(3) {
        debug!(
            "  {} ({}) confidence {:.2}: {}",
            candidate.device.hostname.as_deref().unwrap_or("?"),
            candidate.device.ip,
            candidate.confidence,
            candidate.reason
        );
    }

    candidates
}

pub async fn scan_for_avr_devices(cfg: &DiscoveryConfig) -> Vec<Candidate> {
    scan_for_candidates(DeviceClass::Avr, cfg).await
}

pub async fn scan_for_tv_devices(cfg: &DiscoveryConfig) -> Vec<Candidate> {
    scan_for_candidates(DeviceClass::Tv, cfg).await
}

/// Full TV pipeline: scan, then confirm the high-confidence candidates with
/// a real protocol handshake. Only confirmed endpoints are returned.
pub async fn discover_and_validate_tvs(cfg: &DiscoveryConfig) -> Vec<ValidatedEndpoint> {
    let candidates = scan_for_tv_devices(cfg).await;
    validate::validate_tv_candidates(&candidates, cfg).await
}
