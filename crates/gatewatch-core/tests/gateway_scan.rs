//! End-to-end: admitted events lazily start the scanner, which sweeps with a
//! scripted probe backend until stopped.

use gatewatch_core::probe::ProbeBackend;
use gatewatch_core::{
    AdmissionConfig, AdmissionEvent, Decision, DenyReason, FakeProbe, Gateway, Scanner,
    ScannerConfig,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

fn source() -> IpAddr {
    "203.0.113.50".parse().unwrap()
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn scanner_config() -> ScannerConfig {
    ScannerConfig {
        enabled: true,
        seeds: vec!["192.0.2.20".to_string(), "198.51.100.20".to_string()],
        radius_floor: 1,
        skip_pause_ms: 1,
        action_pause_ms: 1,
        target_pattern: "shop".to_string(),
        exclusions: vec!["198.51.100.21".to_string()],
        probe_port: 443,
        probe_timeout_ms: 50,
        lookup_timeout_ms: 50,
        ..ScannerConfig::default()
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn admitted_connection_starts_sweep_and_records_hits() {
    let probe = Arc::new(
        FakeProbe::new()
            .with_host(ip("192.0.2.20"), &["shop.example.com"])
            .with_open_port(ip("192.0.2.20"), 443)
            .with_host(ip("198.51.100.19"), &["www.example.com"]),
    );
    let backend: Arc<dyn ProbeBackend> = probe.clone();
    let scanner = Arc::new(Scanner::new(scanner_config(), backend).unwrap());
    let gateway = Gateway::new(&AdmissionConfig::default(), Some(scanner.clone()));

    let decision = gateway.handle(&AdmissionEvent::connect(source(), Some("tok".into())));
    assert!(decision.is_allowed());

    let found = wait_for(|| {
        let status = scanner.status();
        !status.hits.is_empty() && probe.reverse_calls(ip("198.51.100.19")) > 0
    })
    .await;
    assert!(found, "scanner never reached the second seed");

    let status = gateway.scan_status().unwrap();
    assert!(status.is_scanning);
    assert_eq!(status.hits[0].address, "192.0.2.20");
    assert_eq!(status.hits[0].hostnames, vec!["shop.example.com".to_string()]);
    assert_eq!(probe.reverse_calls(ip("198.51.100.21")), 0);
    assert_eq!(probe.port_calls(ip("198.51.100.19")), 0);

    gateway.stop_scanner();
    assert!(wait_for(|| !scanner.is_running()).await);
}

#[tokio::test]
async fn operator_range_joins_the_sweep() {
    let probe = Arc::new(FakeProbe::new());
    let backend: Arc<dyn ProbeBackend> = probe.clone();
    let config = ScannerConfig {
        seeds: vec![],
        ..scanner_config()
    };
    let scanner = Arc::new(Scanner::new(config, backend).unwrap());
    let gateway = Gateway::new(&AdmissionConfig::default(), Some(scanner.clone()));

    let range = gateway.add_range("192.0.2.128/31").unwrap().unwrap();
    assert_eq!(range.len(), 2);
    assert!(gateway.start_scanner());

    assert!(wait_for(|| probe.reverse_calls(ip("192.0.2.129")) > 0).await);
    assert_eq!(
        gateway.scan_status().unwrap().extra_ranges,
        vec!["192.0.2.128-192.0.2.129".to_string()]
    );
    gateway.stop_scanner();
}

#[tokio::test]
async fn connection_cap_follows_guard_lifetimes() {
    let gateway = Gateway::new(&AdmissionConfig::default(), None);
    let token = Some("tok".to_string());

    let mut guards = Vec::new();
    for _ in 0..5 {
        match gateway.handle(&AdmissionEvent::connect(source(), token.clone())) {
            Decision::Allow(admission) => guards.push(admission.into_guard()),
            Decision::Deny(reason) => panic!("denied early: {reason}"),
        }
    }
    let sixth = gateway.handle(&AdmissionEvent::connect(source(), token.clone()));
    assert_eq!(sixth.deny_reason(), Some(DenyReason::TooManyConnections));

    guards.pop();
    assert!(gateway
        .handle(&AdmissionEvent::connect(source(), token))
        .is_allowed());
}
