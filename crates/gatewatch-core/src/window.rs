//! Sliding-window state store.
//!
//! Keeps a per-key history of timestamped values. Every read of a key first
//! trims entries that fell out of the window, so a retained entry `t` always
//! satisfies `now - t < window`. The number of keys is bounded: fully expired
//! keys are dropped by [`SlidingWindow::gc`], and inserting a new key at
//! capacity evicts a batch of the quietest keys (about an eighth of the
//! capacity), so the full scan runs once per batch rather than once per key.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A bounded, per-key sliding window of `(Instant, V)` entries.
#[derive(Debug)]
pub struct SlidingWindow<K, V = ()> {
    /// Duration of the sliding window.
    window: Duration,
    /// Maximum number of keys tracked at once.
    max_keys: usize,
    /// Per-key history, oldest first.
    entries: HashMap<K, VecDeque<(Instant, V)>>,
}

impl<K, V> SlidingWindow<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new store.
    ///
    /// * `window` - How long an entry stays visible.
    /// * `max_keys` - Upper bound on distinct keys (at least 1).
    pub fn new(window: Duration, max_keys: usize) -> Self {
        Self {
            window,
            max_keys: max_keys.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of keys currently tracked (including keys with empty history).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `value` at `now` under `key`, trimming the key first.
    pub fn record(&mut self, key: K, now: Instant, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_keys {
            self.make_room(now);
        }
        let window = self.window;
        let history = self.entries.entry(key).or_default();
        trim(history, now, window);
        history.push_back((now, value));
    }

    /// Number of retained entries for `key` at `now`.
    pub fn count(&mut self, key: &K, now: Instant) -> usize {
        self.count_matching(key, now, |_| true)
    }

    /// Number of retained entries for `key` at `now` whose value satisfies `pred`.
    pub fn count_matching<F>(&mut self, key: &K, now: Instant, pred: F) -> usize
    where
        F: Fn(&V) -> bool,
    {
        let window = self.window;
        match self.entries.get_mut(key) {
            Some(history) => {
                trim(history, now, window);
                history.iter().filter(|(_, v)| pred(v)).count()
            }
            None => 0,
        }
    }

    /// Drop expired entries everywhere and remove keys left empty.
    pub fn gc(&mut self, now: Instant) {
        let window = self.window;
        self.entries.retain(|_, history| {
            trim(history, now, window);
            !history.is_empty()
        });
    }

    fn make_room(&mut self, now: Instant) {
        self.gc(now);
        if self.entries.len() < self.max_keys {
            return;
        }

        // Still full: evict the keys that have been quiet the longest.
        let target = self.max_keys - (self.max_keys / 8).max(1);
        let excess = self.entries.len() - target;
        let mut by_activity: Vec<(Option<Instant>, K)> = self
            .entries
            .iter()
            .map(|(k, history)| (history.back().map(|(t, _)| *t), k.clone()))
            .collect();
        by_activity.select_nth_unstable_by_key(excess - 1, |(t, _)| *t);
        for (_, key) in by_activity.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }
}

fn trim<V>(history: &mut VecDeque<(Instant, V)>, now: Instant, window: Duration) {
    while let Some((t, _)) = history.front() {
        if now.saturating_duration_since(*t) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_entries_expire_after_window() {
        let mut w: SlidingWindow<&str> = SlidingWindow::new(secs(5), 16);
        let t0 = Instant::now();
        w.record("a", t0, ());
        w.record("a", t0 + secs(2), ());
        assert_eq!(w.count(&"a", t0 + secs(4)), 2);
        // t0 is exactly one window old and no longer retained
        assert_eq!(w.count(&"a", t0 + secs(5)), 1);
        assert_eq!(w.count(&"a", t0 + secs(7)), 0);
    }

    #[test]
    fn test_count_matching() {
        let mut w: SlidingWindow<u8, String> = SlidingWindow::new(secs(10), 16);
        let t0 = Instant::now();
        w.record(1, t0, "hi".to_string());
        w.record(1, t0, "yo".to_string());
        w.record(1, t0, "hi".to_string());
        assert_eq!(w.count_matching(&1, t0, |m| m == "hi"), 2);
        assert_eq!(w.count_matching(&2, t0, |m| m == "hi"), 0);
    }

    #[test]
    fn test_gc_removes_stale_keys() {
        let mut w: SlidingWindow<&str> = SlidingWindow::new(secs(1), 16);
        let t0 = Instant::now();
        w.record("old", t0, ());
        w.record("new", t0 + secs(3), ());
        w.gc(t0 + secs(3));
        assert_eq!(w.len(), 1);
        assert_eq!(w.count(&"new", t0 + secs(3)), 1);
    }

    #[test]
    fn test_capacity_evicts_quietest_key() {
        let mut w: SlidingWindow<&str> = SlidingWindow::new(secs(60), 2);
        let t0 = Instant::now();
        w.record("a", t0, ());
        w.record("b", t0 + secs(1), ());
        w.record("a", t0 + secs(2), ());
        w.record("c", t0 + secs(3), ());
        assert_eq!(w.len(), 2);
        assert_eq!(w.count(&"b", t0 + secs(3)), 0);
        assert_eq!(w.count(&"a", t0 + secs(3)), 2);
    }

    #[test]
    fn test_eviction_frees_a_batch_of_slots() {
        let mut w: SlidingWindow<u32> = SlidingWindow::new(secs(60), 16);
        let t0 = Instant::now();
        for k in 0..16 {
            w.record(k, t0 + secs(k as u64), ());
        }
        w.record(100, t0 + secs(16), ());
        // The two quietest keys made room
        assert_eq!(w.len(), 15);
        assert_eq!(w.count(&0, t0 + secs(16)), 0);
        assert_eq!(w.count(&1, t0 + secs(16)), 0);
        assert_eq!(w.count(&2, t0 + secs(16)), 1);

        // The next new key fits without evicting anyone
        w.record(101, t0 + secs(17), ());
        assert_eq!(w.len(), 16);
        assert_eq!(w.count(&2, t0 + secs(17)), 1);
    }
}
