//! Engine configuration sections.
//!
//! Both sections deserialize from TOML with per-field defaults, so an empty
//! `[admission]` or `[scanner]` table (or none at all) yields a working
//! configuration. Durations are expressed in milliseconds.

use serde::Deserialize;
use std::time::Duration;

/// `[admission]` section: limits applied by the admission gate.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_spam_window_ms")]
    pub spam_window_ms: u64,
    #[serde(default = "default_spam_limit")]
    pub spam_limit: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections_per_source: usize,
    /// Upper bound on (subject, channel) keys held by each window store.
    #[serde(default = "default_max_tracked_keys")]
    pub max_tracked_keys: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rate_window_ms: default_rate_window_ms(),
            rate_limit: default_rate_limit(),
            spam_window_ms: default_spam_window_ms(),
            spam_limit: default_spam_limit(),
            max_connections_per_source: default_max_connections(),
            max_tracked_keys: default_max_tracked_keys(),
        }
    }
}

impl AdmissionConfig {
    /// The stricter limits of the first gateway guard: 5 per 10 s, 3 repeats per 5 s.
    pub fn strict() -> Self {
        Self {
            rate_window_ms: 10_000,
            rate_limit: 5,
            spam_window_ms: 5_000,
            spam_limit: 3,
            ..Self::default()
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn spam_window(&self) -> Duration {
        Duration::from_millis(self.spam_window_ms)
    }
}

/// `[scanner]` section: background sweep parameters.
///
/// The scanner stays off unless `enabled` is set and at least one seed base
/// is listed.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seed base addresses, swept in order and wrapping.
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default = "default_radius_floor")]
    pub radius_floor: u32,
    #[serde(default = "default_radius_step")]
    pub radius_step: u32,
    /// Pause after any negative pipeline outcome.
    #[serde(default = "default_skip_pause_ms")]
    pub skip_pause_ms: u64,
    /// Pause after a hit.
    #[serde(default = "default_action_pause_ms")]
    pub action_pause_ms: u64,
    /// Case-insensitive substring a reverse-DNS hostname must contain.
    #[serde(default)]
    pub target_pattern: String,
    /// Address text prefixes that are never probed.
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default = "default_whois_timeout_ms")]
    pub whois_timeout_ms: u64,
    /// Run a WHOIS query for every hit (logged only).
    #[serde(default)]
    pub whois_on_hit: bool,
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seeds: Vec::new(),
            radius_floor: default_radius_floor(),
            radius_step: default_radius_step(),
            skip_pause_ms: default_skip_pause_ms(),
            action_pause_ms: default_action_pause_ms(),
            target_pattern: String::new(),
            exclusions: default_exclusions(),
            probe_port: default_probe_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            whois_timeout_ms: default_whois_timeout_ms(),
            whois_on_hit: false,
            max_hits: default_max_hits(),
        }
    }
}

impl ScannerConfig {
    pub fn skip_pause(&self) -> Duration {
        Duration::from_millis(self.skip_pause_ms)
    }

    pub fn action_pause(&self) -> Duration {
        Duration::from_millis(self.action_pause_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }
}

fn default_rate_window_ms() -> u64 {
    5_000
}
fn default_rate_limit() -> usize {
    50
}
fn default_spam_window_ms() -> u64 {
    10_000
}
fn default_spam_limit() -> usize {
    10
}
fn default_max_connections() -> usize {
    5
}
fn default_max_tracked_keys() -> usize {
    100_000
}
fn default_radius_floor() -> u32 {
    10
}
fn default_radius_step() -> u32 {
    1
}
fn default_skip_pause_ms() -> u64 {
    250
}
fn default_action_pause_ms() -> u64 {
    5_000
}
fn default_exclusions() -> Vec<String> {
    ["0.", "127.", "169.254.", "224.", "255."]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_probe_port() -> u16 {
    443
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_lookup_timeout_ms() -> u64 {
    3_000
}
fn default_whois_timeout_ms() -> u64 {
    10_000
}
fn default_max_hits() -> usize {
    1_000
}
