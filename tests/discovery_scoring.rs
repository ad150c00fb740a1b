//! Scoring and ranking properties over a realistic household device list.

use avlink::config::DiscoveryConfig;
use avlink::discovery::rules::{normalize_oui, score_device};
use avlink::discovery::{rank_candidates, DeviceClass};
use avlink::net::NetworkDevice;

fn device(ip: &str, hostname: Option<&str>, mac: Option<&str>, reachable: bool) -> NetworkDevice {
    NetworkDevice {
        ip: ip.to_string(),
        hostname: hostname.map(|h| h.to_string()),
        mac_address: mac.map(|m| m.to_string()),
        is_reachable: reachable,
    }
}

fn household() -> Vec<NetworkDevice> {
    vec![
        device("192.168.50.1", Some("router"), Some("aa:bb:cc:00:11:22"), true),
        device("192.168.50.23", Some("laptop"), Some("f0:18:98:01:02:03"), true),
        device("192.168.50.99", Some("avr"), Some("0:5:cd:7d:d8:a6"), true),
        device("192.168.50.105", Some("denon-avr-x3700h"), None, false),
        device("192.168.50.120", Some("vizio-smartcast-tv"), Some("00:19:9d:aa:bb:cc"), true),
        device("192.168.50.125", Some("samsung-frame-tv"), None, true),
        device("192.168.50.200", None, Some("2c:64:1f:10:20:30"), true),
    ]
}

#[test]
fn avr_scan_ranks_the_receiver_first() {
    let cfg = DiscoveryConfig::default();
    let ranked = rank_candidates(&household(), DeviceClass::Avr, &cfg);

    // The unreachable denon entry is excluded despite its strong hostname
    assert!(ranked.iter().all(|c| c.device.ip != "192.168.50.105"));

    assert_eq!(ranked[0].device.ip, "192.168.50.99");
    // hostname 0.8 + vendor OUI 0.4 + octet prior 0.1
    assert!((ranked[0].confidence - 1.3).abs() < 1e-6);
    assert!(ranked[0].reason.contains("hostname mentions avr"));

    // The router and laptop never make the list
    assert!(ranked.iter().all(|c| c.device.ip != "192.168.50.1"));
    assert!(ranked.iter().all(|c| c.device.ip != "192.168.50.23"));
}

#[test]
fn tv_scan_finds_both_tvs_and_attributes_brands() {
    let cfg = DiscoveryConfig::default();
    let ranked = rank_candidates(&household(), DeviceClass::Tv, &cfg);

    let vizio = ranked
        .iter()
        .find(|c| c.device.ip == "192.168.50.120")
        .expect("vizio tv should be found");
    let samsung = ranked
        .iter()
        .find(|c| c.device.ip == "192.168.50.125")
        .expect("samsung tv should be found");

    assert_eq!(vizio.brand.as_deref(), Some("Vizio"));
    assert_eq!(samsung.brand.as_deref(), Some("Samsung"));
    // vizio (0.9) + smartcast (0.8) + tv (0.5) + OUI (0.4) + octet (0.1)
    assert!(vizio.confidence > samsung.confidence);
    assert_eq!(ranked[0].device.ip, "192.168.50.120");
}

#[test]
fn tv_scan_accepts_an_oui_plus_prior_without_hostname() {
    let cfg = DiscoveryConfig::default();
    let ranked = rank_candidates(&household(), DeviceClass::Tv, &cfg);

    // 192.168.50.200: no hostname, Vizio OUI (0.4) + octet prior (0.1) = 0.5
    let anon = ranked
        .iter()
        .find(|c| c.device.ip == "192.168.50.200")
        .expect("vizio-oui device should clear the tv threshold");
    assert!((anon.confidence - 0.5).abs() < 1e-6);
    assert_eq!(anon.brand.as_deref(), Some("Vizio"));
}

#[test]
fn class_rule_tables_are_independent() {
    let cfg = DiscoveryConfig::default();
    let avr = device("192.168.50.99", Some("avr"), Some("0:5:cd:7d:d8:a6"), true);

    // The receiver is a strong AVR candidate but not a TV candidate
    assert!(score_device(&avr, DeviceClass::Avr, &cfg).is_some());
    assert!(score_device(&avr, DeviceClass::Tv, &cfg).is_none());
}

#[test]
fn oui_normalization_handles_unpadded_bsd_style_macs() {
    // macOS arp output drops leading zeros per octet
    assert_eq!(normalize_oui("0:5:cd:7d:d8:a6").as_deref(), Some("0005cd"));
    assert_eq!(normalize_oui("2c:64:1f:10:20:30").as_deref(), Some("2c641f"));
    assert_eq!(normalize_oui("2C-64-1F-10-20-30").as_deref(), Some("2c641f"));
}

#[test]
fn octet_priors_are_exclusive_bounds() {
    let cfg = DiscoveryConfig::default();

    // Exactly on the low bound: prior must not fire, leaving 0.8 for "avr"
    let on_bound = device("192.168.50.90", Some("avr"), None, true);
    let candidate = score_device(&on_bound, DeviceClass::Avr, &cfg).unwrap();
    assert!((candidate.confidence - 0.8).abs() < 1e-6);

    // Just inside: prior fires
    let inside = device("192.168.50.91", Some("avr"), None, true);
    let candidate = score_device(&inside, DeviceClass::Avr, &cfg).unwrap();
    assert!((candidate.confidence - 0.9).abs() < 1e-6);
}
