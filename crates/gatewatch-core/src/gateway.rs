//! Gateway façade: runs every inbound event through the admission gate and
//! lazily starts the background scanner on the first admitted event.
//! An explicit stop holds until [`Gateway::start_scanner`] is called.
//!
//! The admission gate is synchronous and guarded by a short-lived mutex; the
//! scanner runs on its own task and never blocks a decision.

use crate::admission::{AdmissionEvent, AdmissionGate, Decision};
use crate::config::AdmissionConfig;
use crate::error::ScanError;
use crate::ipv4::AddrRange;
use crate::scanner::{ScanStatus, Scanner};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

pub struct Gateway {
    gate: Mutex<AdmissionGate>,
    scanner: Option<Arc<Scanner>>,
}

impl Gateway {
    pub fn new(config: &AdmissionConfig, scanner: Option<Arc<Scanner>>) -> Self {
        Self {
            gate: Mutex::new(AdmissionGate::new(config)),
            scanner,
        }
    }

    /// Decide on `event`. An allowed event starts the scanner if it is
    /// enabled, not already running and not explicitly stopped.
    pub fn handle(&self, event: &AdmissionEvent) -> Decision {
        self.handle_at(event, Instant::now())
    }

    pub fn handle_at(&self, event: &AdmissionEvent, now: Instant) -> Decision {
        let decision = self.gate().evaluate_at(event, now);
        match &decision {
            Decision::Allow(_) => {
                if let Some(scanner) = &self.scanner {
                    if scanner.start_unless_halted() {
                        info!(source = %event.source, "scanner started on first admitted event");
                    }
                }
            }
            Decision::Deny(reason) => {
                debug!(source = %event.source, reason = ?reason, "event denied");
            }
        }
        decision
    }

    /// Explicitly start the scanner, lifting an earlier stop. Returns `true`
    /// if a new task was spawned.
    pub fn start_scanner(&self) -> bool {
        self.scanner.as_ref().is_some_and(|s| s.start())
    }

    pub fn scanner_running(&self) -> bool {
        self.scanner.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn stop_scanner(&self) {
        if let Some(scanner) = &self.scanner {
            scanner.stop();
        }
    }

    pub fn scan_status(&self) -> Option<ScanStatus> {
        self.scanner.as_ref().map(|s| s.status())
    }

    /// Add an operator range to the scanner's sweep plan.
    pub fn add_range(&self, text: &str) -> Option<Result<AddrRange, ScanError>> {
        self.scanner.as_ref().map(|s| s.add_range(text))
    }

    /// Evict expired rate and spam keys.
    pub fn gc(&self) {
        let mut gate = self.gate();
        gate.gc(Instant::now());
        let (rate_keys, spam_keys) = gate.tracked_keys();
        debug!(rate_keys, spam_keys, "admission state collected");
    }

    fn gate(&self) -> MutexGuard<'_, AdmissionGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
