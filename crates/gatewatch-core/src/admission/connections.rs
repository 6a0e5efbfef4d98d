//! Per-source connection counting.
//!
//! An admitted connection holds a [`ConnectionGuard`]; dropping the guard is
//! the connection's end-of-life signal and decrements the count exactly once.
//! Entries are removed when their count reaches zero.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Counts = Arc<Mutex<HashMap<IpAddr, usize>>>;

/// Tracks open connections per source address against a fixed cap.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    max_per_source: usize,
    counts: Counts,
}

impl ConnectionTracker {
    pub fn new(max_per_source: usize) -> Self {
        Self {
            max_per_source,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Increment the count for `source` unless it is at the cap.
    ///
    /// Returns `None` when the source already has `max_per_source`
    /// connections open.
    pub fn try_acquire(&self, source: IpAddr) -> Option<ConnectionGuard> {
        let mut counts = lock(&self.counts);
        let current = counts.entry(source).or_insert(0);
        if *current >= self.max_per_source {
            if *current == 0 {
                counts.remove(&source);
            }
            return None;
        }
        *current += 1;
        Some(ConnectionGuard {
            source,
            counts: self.counts.clone(),
        })
    }

    /// Current number of open connections from `source`.
    pub fn count(&self, source: &IpAddr) -> usize {
        lock(&self.counts).get(source).copied().unwrap_or(0)
    }

    /// Number of sources with at least one open connection.
    pub fn sources(&self) -> usize {
        lock(&self.counts).len()
    }
}

/// RAII guard that decrements the source's connection count on drop.
/// Owns an `Arc` so it can be moved into the connection's task.
#[derive(Debug)]
pub struct ConnectionGuard {
    source: IpAddr,
    counts: Counts,
}

impl ConnectionGuard {
    pub fn source(&self) -> IpAddr {
        self.source
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut counts = lock(&self.counts);
        if let Some(current) = counts.get_mut(&self.source) {
            *current = current.saturating_sub(1);
            if *current == 0 {
                counts.remove(&self.source);
            }
        }
    }
}

fn lock(counts: &Counts) -> MutexGuard<'_, HashMap<IpAddr, usize>> {
    counts.lock().unwrap_or_else(PoisonError::into_inner)
}
