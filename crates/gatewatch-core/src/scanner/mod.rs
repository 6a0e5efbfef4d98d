//! Background scanner: sweeps IPv4 ranges around seed bases, filters
//! reverse-DNS hostnames against a target pattern and probes matching hosts
//! for an open port.
//!
//! # Lifecycle
//!
//! A [`Scanner`] is created once and shared behind an `Arc`. [`Scanner::start`]
//! spawns the sweep task if none is running (at most one at a time);
//! [`Scanner::stop`] raises a stop signal that the task checks between
//! pipeline stages, inside every pause and at sweep boundaries. When the task
//! exits the running flag is cleared and the scanner can be started again.
//!
//! A stop also marks the scanner halted. Lazy starts (see
//! [`Scanner::start_unless_halted`]) leave a halted scanner alone; only an
//! explicit [`Scanner::start`] clears the mark.
//!
//! # Sweep plan
//!
//! Each cycle visits the configured seed bases in order, then every range
//! added through [`Scanner::add_range`], then wraps around. Seed sweeps cover
//! `[base - radius, base + radius]`; each hit widens the radius, and a seed
//! sweep without hits resets it to the configured floor.

mod engine;
pub mod status;

pub use status::{Hit, ScanCursor, ScanStatus};

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::ipv4::{self, AddrRange};
use crate::probe::ProbeBackend;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

/// State shared between the sweep task and status readers.
#[derive(Debug)]
struct ScanState {
    cursor: ScanCursor,
    extra_ranges: Vec<AddrRange>,
    hits: VecDeque<Hit>,
}

/// The scanner engine handle.
pub struct Scanner {
    config: ScannerConfig,
    /// Seed bases, decoded.
    seeds: Vec<u32>,
    /// Lowercased hostname pattern.
    pattern: String,
    backend: Arc<dyn ProbeBackend>,
    running: AtomicBool,
    /// Set by `stop`, cleared by an explicit `start`.
    halted: AtomicBool,
    stop_tx: watch::Sender<bool>,
    state: Mutex<ScanState>,
}

impl Scanner {
    /// Create a scanner. Fails if a seed base is not a valid IPv4 address.
    pub fn new(config: ScannerConfig, backend: Arc<dyn ProbeBackend>) -> Result<Self, ScanError> {
        let seeds = config
            .seeds
            .iter()
            .map(|s| ipv4::decode(s))
            .collect::<Result<Vec<_>, _>>()?;

        let start = seeds.first().copied().unwrap_or(0);
        let cursor = ScanCursor::new(start, config.radius_floor);
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            pattern: config.target_pattern.to_lowercase(),
            seeds,
            backend,
            running: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            stop_tx,
            state: Mutex::new(ScanState {
                cursor,
                extra_ranges: Vec::new(),
                hits: VecDeque::new(),
            }),
            config,
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Spawn the sweep task unless one is already running.
    ///
    /// Returns `true` if this call started the task. Does nothing (and
    /// returns `false`) when scanning is not enabled in the configuration.
    /// Clears a previous [`stop`](Self::stop), including one the running task
    /// has not acted on yet. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            warn!("scanner is disabled in configuration, not starting");
            return false;
        }
        self.halted.store(false, Ordering::Release);
        self.stop_tx.send_replace(false);
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let scanner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                scanner.run(scanner.stop_tx.subscribe()).await;
                scanner.running.store(false, Ordering::Release);
                // A start that raced the exit is picked up here.
                if scanner.is_halted()
                    || scanner
                        .running
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    break;
                }
            }
            info!("scanner stopped");
        });
        true
    }

    /// Start the scanner unless it is disabled, running, or was stopped
    /// explicitly. Used for the lazy start on admitted events.
    pub fn start_unless_halted(self: &Arc<Self>) -> bool {
        if !self.config.enabled || self.is_halted() || self.is_running() {
            return false;
        }
        self.start()
    }

    /// Ask the sweep task to stop at its next check point and keep the
    /// scanner halted until the next explicit [`start`](Self::start).
    pub fn stop(&self) {
        if self.is_running() {
            info!("scanner stop requested");
        }
        self.halted.store(true, Ordering::Release);
        self.stop_tx.send_replace(true);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Owned snapshot of progress, extra ranges and recorded hits.
    pub fn status(&self) -> ScanStatus {
        let state = self.state();
        ScanStatus::from_parts(
            self.is_running(),
            &state.cursor,
            state.extra_ranges.iter().map(|r| r.to_string()).collect(),
            state.hits.iter().cloned().collect(),
        )
    }

    /// Append an operator range to the sweep plan.
    ///
    /// Accepts `a.b.c.d`, `a.b.c.d-e.f.g.h` and `a.b.c.d/n`. The range is
    /// swept once per cycle, after the seed bases. It is kept apart from the
    /// exclusion list, which never changes at runtime.
    pub fn add_range(&self, text: &str) -> Result<AddrRange, ScanError> {
        let range = AddrRange::parse(text)?;
        self.state().extra_ranges.push(range);
        info!(range = %range, addresses = range.len(), "extra range added");
        Ok(range)
    }

    pub fn cursor(&self) -> ScanCursor {
        self.state().cursor.clone()
    }

    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FakeProbe;
    use std::time::Duration;

    fn enabled_config() -> ScannerConfig {
        ScannerConfig {
            enabled: true,
            seeds: vec!["192.0.2.10".to_string()],
            radius_floor: 1,
            skip_pause_ms: 5,
            action_pause_ms: 5,
            target_pattern: "example".to_string(),
            ..ScannerConfig::default()
        }
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let config = ScannerConfig {
            seeds: vec!["not-an-ip".to_string()],
            ..ScannerConfig::default()
        };
        assert!(Scanner::new(config, Arc::new(FakeProbe::new())).is_err());
    }

    #[test]
    fn test_add_range_and_status_snapshot() {
        let scanner = Scanner::new(enabled_config(), Arc::new(FakeProbe::new())).unwrap();
        scanner.add_range("198.51.100.0/30").unwrap();
        assert!(scanner.add_range("garbage").is_err());

        let status = scanner.status();
        assert!(!status.is_scanning);
        assert_eq!(status.current_address, "192.0.2.10");
        assert_eq!(status.cursor.radius, 1);
        assert_eq!(status.extra_ranges, vec!["198.51.100.0-198.51.100.3".to_string()]);
        assert_eq!(status.total_probed, 0);
    }

    #[tokio::test]
    async fn test_disabled_scanner_does_not_start() {
        let config = ScannerConfig {
            enabled: false,
            ..enabled_config()
        };
        let scanner = Arc::new(Scanner::new(config, Arc::new(FakeProbe::new())).unwrap());
        assert!(!scanner.start());
        assert!(!scanner.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_clears_flag() {
        let scanner = Arc::new(Scanner::new(enabled_config(), Arc::new(FakeProbe::new())).unwrap());
        assert!(scanner.start());
        assert!(!scanner.start());
        assert!(scanner.is_running());

        scanner.stop();
        for _ in 0..200 {
            if !scanner.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!scanner.is_running());
        assert!(scanner.is_halted());
        assert!(!scanner.start_unless_halted());
        assert!(!scanner.is_running());

        assert!(scanner.start());
        assert!(!scanner.is_halted());
        scanner.stop();
    }

    #[tokio::test]
    async fn test_start_right_after_stop_keeps_scanning() {
        let scanner = Arc::new(Scanner::new(enabled_config(), Arc::new(FakeProbe::new())).unwrap());
        assert!(scanner.start());
        scanner.stop();
        // The task may not have seen the stop yet; the start still wins.
        scanner.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scanner.is_running());
        assert!(!scanner.is_halted());
        scanner.stop();
    }
}
