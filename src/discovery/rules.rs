//! Heuristic candidate scoring
//!
//! Scoring is a fixed, ordered table of independent rules (predicate +
//! weight + reason text, optionally a brand attribution). Scores are
//! additive and deliberately unclamped: this is a ranking signal, not a
//! probability, so only relative order and the acceptance threshold matter.
//! Each firing rule appends its reason so operators can see which
//! heuristics produced a match.

use crate::config::DiscoveryConfig;
use crate::net::NetworkDevice;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Target device class for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Avr,
    Tv,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Avr => "avr",
            DeviceClass::Tv => "tv",
        }
    }
}

/// A device suspected (by heuristic) to be of the target class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub device: NetworkDevice,
    pub confidence: f32,
    /// Audit trail of which heuristics fired, comma-joined.
    pub reason: String,
    /// Set by the first brand-carrying rule that fires (TV scans only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

enum Matcher {
    HostnameContains(&'static str),
    /// Model-number-like token, e.g. "avr2312" or "nr1609"
    HostnameModelToken,
    OuiIn(&'static [&'static str]),
    /// Weak prior: last IP octet inside the class's usual range
    /// (exclusive bounds, taken from DiscoveryConfig).
    LastOctetPrior,
}

struct ScoreRule {
    weight: f32,
    reason: &'static str,
    brand: Option<&'static str>,
    matcher: Matcher,
}

static MODEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // pattern is a compile-time constant
    Regex::new(r"^[a-zA-Z]{2,6}\d{4,}").expect("model token regex must compile")
});

/// MAC OUI prefixes seen on D&M (Denon/Marantz) receivers on the reference
/// network. Normalized form: lower-case hex, zero-padded, no separators.
const AVR_VENDOR_OUIS: &[&str] = &["0005cd", "000678"];

/// MAC OUI prefixes registered to Vizio.
const TV_VENDOR_OUIS: &[&str] = &["00199d", "2c641f"];

const AVR_RULES: &[ScoreRule] = &[
    ScoreRule {
        weight: 0.9,
        reason: "hostname mentions denon",
        brand: None,
        matcher: Matcher::HostnameContains("denon"),
    },
    ScoreRule {
        weight: 0.8,
        reason: "hostname mentions avr",
        brand: None,
        matcher: Matcher::HostnameContains("avr"),
    },
    ScoreRule {
        weight: 0.7,
        reason: "hostname mentions marantz",
        brand: None,
        matcher: Matcher::HostnameContains("marantz"),
    },
    ScoreRule {
        weight: 0.3,
        reason: "hostname looks like a model number",
        brand: None,
        matcher: Matcher::HostnameModelToken,
    },
    ScoreRule {
        weight: 0.4,
        reason: "MAC vendor is a known AVR maker",
        brand: None,
        matcher: Matcher::OuiIn(AVR_VENDOR_OUIS),
    },
    ScoreRule {
        weight: 0.1,
        reason: "IP in the usual AVR range",
        brand: None,
        matcher: Matcher::LastOctetPrior,
    },
];

const TV_RULES: &[ScoreRule] = &[
    ScoreRule {
        weight: 0.9,
        reason: "hostname mentions vizio",
        brand: Some("Vizio"),
        matcher: Matcher::HostnameContains("vizio"),
    },
    ScoreRule {
        weight: 0.8,
        reason: "hostname mentions smartcast",
        brand: Some("Vizio"),
        matcher: Matcher::HostnameContains("smartcast"),
    },
    ScoreRule {
        weight: 0.7,
        reason: "hostname mentions samsung",
        brand: Some("Samsung"),
        matcher: Matcher::HostnameContains("samsung"),
    },
    ScoreRule {
        weight: 0.6,
        reason: "hostname mentions lg",
        brand: Some("LG"),
        matcher: Matcher::HostnameContains("lg"),
    },
    ScoreRule {
        weight: 0.6,
        reason: "hostname mentions sony",
        brand: Some("Sony"),
        matcher: Matcher::HostnameContains("sony"),
    },
    ScoreRule {
        weight: 0.6,
        reason: "hostname mentions bravia",
        brand: Some("Sony"),
        matcher: Matcher::HostnameContains("bravia"),
    },
    ScoreRule {
        weight: 0.5,
        reason: "hostname mentions tv",
        brand: None,
        matcher: Matcher::HostnameContains("tv"),
    },
    ScoreRule {
        weight: 0.4,
        reason: "MAC vendor is a known TV maker",
        brand: Some("Vizio"),
        matcher: Matcher::OuiIn(TV_VENDOR_OUIS),
    },
    ScoreRule {
        weight: 0.1,
        reason: "IP in the usual TV range",
        brand: None,
        matcher: Matcher::LastOctetPrior,
    },
];

/// Normalize a colon- or dash-separated MAC to its lower-case, zero-padded
/// OUI prefix ("0:5:cd:7d:d8:a6" -> "0005cd").
pub fn normalize_oui(mac: &str) -> Option<String> {
    let octets: Vec<&str> = mac.split([':', '-']).collect();
    if octets.len() < 3 {
        return None;
    }
    let mut oui = String::with_capacity(6);
    for octet in &octets[..3] {
        let value = u8::from_str_radix(octet, 16).ok()?;
        oui.push_str(&format!("{:02x}", value));
    }
    Some(oui)
}

fn last_octet(ip: &str) -> Option<u8> {
    ip.rsplit('.').next()?.parse().ok()
}

fn matches(rule: &ScoreRule, device: &NetworkDevice, octet_range: (u8, u8)) -> bool {
    match &rule.matcher {
        Matcher::HostnameContains(needle) => device
            .hostname
            .as_deref()
            .is_some_and(|h| h.to_lowercase().contains(needle)),
        Matcher::HostnameModelToken => device
            .hostname
            .as_deref()
            .is_some_and(|h| MODEL_TOKEN.is_match(h)),
        Matcher::OuiIn(ouis) => device
            .mac_address
            .as_deref()
            .and_then(normalize_oui)
            .is_some_and(|oui| ouis.contains(&oui.as_str())),
        Matcher::LastOctetPrior => last_octet(&device.ip)
            .is_some_and(|octet| octet > octet_range.0 && octet < octet_range.1),
    }
}

/// Score one device against the rule table for `class`. Returns a candidate
/// only when the device is reachable and the total clears the class
/// threshold (strictly).
pub fn score_device(
    device: &NetworkDevice,
    class: DeviceClass,
    cfg: &DiscoveryConfig,
) -> Option<Candidate> {
    if !device.is_reachable {
        return None;
    }

    let (rules, threshold, octet_range) = match class {
        DeviceClass::Avr => (
            AVR_RULES,
            cfg.avr_confidence_threshold,
            (cfg.avr_octet_low, cfg.avr_octet_high),
        ),
        DeviceClass::Tv => (
            TV_RULES,
            cfg.tv_confidence_threshold,
            (cfg.tv_octet_low, cfg.tv_octet_high),
        ),
    };

    let mut confidence = 0.0f32;
    let mut reasons: Vec<&'static str> = Vec::new();
    let mut brand: Option<&'static str> = None;

    for rule in rules {
        if matches(rule, device, octet_range) {
            confidence += rule.weight;
            reasons.push(rule.reason);
            if brand.is_none() {
                brand = rule.brand;
            }
        }
    }

    if confidence <= threshold {
        return None;
    }

    Some(Candidate {
        device: device.clone(),
        confidence,
        reason: reasons.join(", "),
        brand: brand.map(|b| b.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(ip: &str, hostname: Option<&str>, mac: Option<&str>) -> NetworkDevice {
        NetworkDevice {
            ip: ip.to_string(),
            hostname: hostname.map(|h| h.to_string()),
            mac_address: mac.map(|m| m.to_string()),
            is_reachable: true,
        }
    }

    #[test]
    fn test_normalize_oui_pads_and_lowercases() {
        assert_eq!(normalize_oui("0:5:cd:7d:d8:a6").as_deref(), Some("0005cd"));
        assert_eq!(
            normalize_oui("00:19:9D:aa:bb:cc").as_deref(),
            Some("00199d")
        );
        assert_eq!(normalize_oui("not-a-mac"), None);
        assert_eq!(normalize_oui("aa:bb"), None);
    }

    #[test]
    fn test_avr_hostname_and_oui_and_octet_all_fire() {
        // The reference scenario: arp line "avr (192.168.50.99) at 0:5:cd:7d:d8:a6"
        let cfg = DiscoveryConfig::default();
        let candidate = score_device(
            &device("192.168.50.99", Some("avr"), Some("0:5:cd:7d:d8:a6")),
            DeviceClass::Avr,
            &cfg,
        )
        .expect("should be accepted");

        // hostname 0.8 + OUI 0.4 + octet prior 0.1
        assert!(candidate.confidence >= 0.8);
        assert!((candidate.confidence - 1.3).abs() < 1e-6);
        assert!(candidate.reason.contains("hostname mentions avr"));
        assert!(candidate.reason.contains("known AVR maker"));
        assert!(candidate.reason.contains("usual AVR range"));
    }

    #[test]
    fn test_unreachable_device_never_becomes_candidate() {
        let cfg = DiscoveryConfig::default();
        let mut dev = device("192.168.50.99", Some("denon-avr"), None);
        dev.is_reachable = false;
        assert!(score_device(&dev, DeviceClass::Avr, &cfg).is_none());
    }

    #[test]
    fn test_below_threshold_rejected() {
        let cfg = DiscoveryConfig::default();
        // Only the octet prior fires: 0.1 <= 0.2
        let dev = device("192.168.1.100", Some("printer"), Some("11:22:33:44:55:66"));
        assert!(score_device(&dev, DeviceClass::Avr, &cfg).is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut cfg = DiscoveryConfig::default();
        cfg.avr_confidence_threshold = 0.3;
        // Model token alone scores exactly 0.3, which must not pass a 0.3 threshold
        let dev = device("192.168.1.50", Some("xx12345"), None);
        assert!(score_device(&dev, DeviceClass::Avr, &cfg).is_none());
    }

    #[test]
    fn test_model_token_heuristic() {
        let cfg = DiscoveryConfig::default();
        let candidate = score_device(
            &device("192.168.1.50", Some("nr1609"), None),
            DeviceClass::Avr,
            &cfg,
        )
        .expect("model token should clear the AVR threshold");
        assert!((candidate.confidence - 0.3).abs() < 1e-6);
        assert_eq!(candidate.reason, "hostname looks like a model number");
    }

    #[test]
    fn test_scores_are_additive_and_unclamped() {
        let cfg = DiscoveryConfig::default();
        // "denonavr2312" fires denon + avr + model token
        let candidate = score_device(
            &device("192.168.50.99", Some("denonavr2312"), None),
            DeviceClass::Avr,
            &cfg,
        )
        .unwrap();
        assert!(candidate.confidence > 1.0);
        assert!((candidate.confidence - 2.1).abs() < 1e-6); // 0.9 + 0.8 + 0.3 + 0.1
    }

    #[test]
    fn test_tv_brand_first_match_wins() {
        let cfg = DiscoveryConfig::default();
        // "vizio" (brand Vizio) fires before "tv"; a later TV-vendor OUI rule
        // must not overwrite the brand either.
        let candidate = score_device(
            &device(
                "192.168.1.120",
                Some("vizio-smartcast-tv"),
                Some("00:19:9d:01:02:03"),
            ),
            DeviceClass::Tv,
            &cfg,
        )
        .unwrap();
        assert_eq!(candidate.brand.as_deref(), Some("Vizio"));
        assert!(candidate.reason.contains("vizio"));
        assert!(candidate.reason.contains("smartcast"));
    }

    #[test]
    fn test_tv_threshold_higher_than_avr() {
        let cfg = DiscoveryConfig::default();
        // Octet prior alone (0.1) never passes; "tv" alone (0.5) does
        assert!(score_device(
            &device("192.168.1.120", None, Some("11:22:33:44:55:66")),
            DeviceClass::Tv,
            &cfg
        )
        .is_none());
        assert!(score_device(
            &device("192.168.1.50", Some("bedroom-tv"), None),
            DeviceClass::Tv,
            &cfg
        )
        .is_some());
    }

    #[test]
    fn test_tv_brand_from_other_vendors() {
        let cfg = DiscoveryConfig::default();
        let candidate = score_device(
            &device("192.168.1.125", Some("samsung-frame"), None),
            DeviceClass::Tv,
            &cfg,
        )
        .unwrap();
        assert_eq!(candidate.brand.as_deref(), Some("Samsung"));
    }
}
