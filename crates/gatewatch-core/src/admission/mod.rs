//! Admission gate: decides whether an inbound connection or message event
//! is let through.
//!
//! Rules run in a fixed order and the first match wins:
//!
//! 1. missing token → [`DenyReason::Unauthorized`]
//! 2. `(subject, channel)` over the rate window budget → [`DenyReason::RateLimited`]
//! 3. same message text repeated too often → [`DenyReason::SpamDetected`]
//! 4. connect event from a source at its cap → [`DenyReason::TooManyConnections`]
//! 5. otherwise allow
//!
//! Events without a subject or channel skip rules 2 and 3 entirely.

pub mod connections;
pub mod limits;

pub use connections::{ConnectionGuard, ConnectionTracker};
pub use limits::{ChannelKey, RateLimiter, SpamFilter};

use crate::config::AdmissionConfig;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Instant;
use tracing::debug;

/// What the event represents on the connection's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new connection; subject to the per-source cap.
    Connect,
    /// A message on an already admitted connection.
    Message,
}

/// An inbound event as seen by the gate.
#[derive(Debug, Clone)]
pub struct AdmissionEvent {
    pub kind: EventKind,
    pub token: Option<String>,
    pub subject_id: Option<String>,
    pub channel_id: Option<String>,
    pub message: Option<String>,
    pub source: IpAddr,
}

impl AdmissionEvent {
    pub fn connect(source: IpAddr, token: Option<String>) -> Self {
        Self {
            kind: EventKind::Connect,
            token,
            subject_id: None,
            channel_id: None,
            message: None,
            source,
        }
    }

    pub fn message(
        source: IpAddr,
        token: Option<String>,
        subject_id: impl Into<String>,
        channel_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            token,
            subject_id: Some(subject_id.into()),
            channel_id: Some(channel_id.into()),
            message: Some(message.into()),
            source,
        }
    }

    fn channel_key(&self) -> Option<ChannelKey> {
        match (&self.subject_id, &self.channel_id) {
            (Some(s), Some(c)) => Some((s.clone(), c.clone())),
            _ => None,
        }
    }
}

/// Why an event was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    Unauthorized,
    RateLimited,
    SpamDetected,
    TooManyConnections,
}

impl DenyReason {
    /// Message reported to the denied party.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::Unauthorized => "Unauthorized access",
            DenyReason::RateLimited => "Rate limit exceeded",
            DenyReason::SpamDetected => "Spam message detected",
            DenyReason::TooManyConnections => "Too many connections",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A granted admission. Holds the connection slot for connect events.
#[derive(Debug, Default)]
pub struct Admission {
    guard: Option<ConnectionGuard>,
}

impl Admission {
    /// Take the connection guard; dropping it releases the slot.
    pub fn into_guard(self) -> Option<ConnectionGuard> {
        self.guard
    }
}

/// Outcome of [`AdmissionGate::evaluate`].
#[derive(Debug)]
pub enum Decision {
    Allow(Admission),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Deny(reason) => Some(*reason),
            Decision::Allow(_) => None,
        }
    }
}

/// The admission gate: rate limiter, spam filter and connection cap.
#[derive(Debug)]
pub struct AdmissionGate {
    rate: RateLimiter,
    spam: SpamFilter,
    connections: ConnectionTracker,
}

impl AdmissionGate {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            rate: RateLimiter::new(
                config.rate_limit,
                config.rate_window(),
                config.max_tracked_keys,
            ),
            spam: SpamFilter::new(
                config.spam_limit,
                config.spam_window(),
                config.max_tracked_keys,
            ),
            connections: ConnectionTracker::new(config.max_connections_per_source),
        }
    }

    /// Evaluate `event` at the current instant.
    pub fn evaluate(&mut self, event: &AdmissionEvent) -> Decision {
        self.evaluate_at(event, Instant::now())
    }

    /// Evaluate `event` as if it arrived at `now`.
    pub fn evaluate_at(&mut self, event: &AdmissionEvent, now: Instant) -> Decision {
        let has_token = event.token.as_deref().is_some_and(|t| !t.is_empty());
        if !has_token {
            debug!(source = %event.source, "denied: missing token");
            return Decision::Deny(DenyReason::Unauthorized);
        }

        if let Some(key) = event.channel_key() {
            if !self.rate.check_and_record(&key, now) {
                debug!(subject = %key.0, channel = %key.1, "denied: rate limited");
                return Decision::Deny(DenyReason::RateLimited);
            }

            if let Some(message) = event.message.as_deref() {
                if self.spam.record_and_check(&key, message, now) {
                    debug!(subject = %key.0, channel = %key.1, "denied: spam");
                    return Decision::Deny(DenyReason::SpamDetected);
                }
            }
        }

        let guard = match event.kind {
            EventKind::Connect => match self.connections.try_acquire(event.source) {
                Some(guard) => Some(guard),
                None => {
                    debug!(source = %event.source, "denied: too many connections");
                    return Decision::Deny(DenyReason::TooManyConnections);
                }
            },
            EventKind::Message => None,
        };

        Decision::Allow(Admission { guard })
    }

    /// Evict keys whose windows have fully expired.
    pub fn gc(&mut self, now: Instant) {
        self.rate.gc(now);
        self.spam.gc(now);
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// `(rate keys, spam keys)` currently held.
    pub fn tracked_keys(&self) -> (usize, usize) {
        (self.rate.tracked_keys(), self.spam.tracked_keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn src() -> IpAddr {
        "198.51.100.7".parse().unwrap()
    }

    fn token() -> Option<String> {
        Some("t0ken".to_string())
    }

    fn msg(text: &str) -> AdmissionEvent {
        AdmissionEvent::message(src(), token(), "u1", "c1", text)
    }

    #[test]
    fn test_missing_token_is_unauthorized() {
        let mut gate = AdmissionGate::new(&AdmissionConfig::default());
        let event = AdmissionEvent::connect(src(), None);
        assert_eq!(gate.evaluate(&event).deny_reason(), Some(DenyReason::Unauthorized));

        let empty = AdmissionEvent::connect(src(), Some(String::new()));
        assert_eq!(gate.evaluate(&empty).deny_reason(), Some(DenyReason::Unauthorized));
    }

    #[test]
    fn test_rate_limit_window() {
        let config = AdmissionConfig {
            rate_limit: 3,
            rate_window_ms: 5_000,
            spam_limit: 100,
            ..AdmissionConfig::default()
        };
        let mut gate = AdmissionGate::new(&config);
        let t0 = Instant::now();

        for i in 0..3 {
            let d = gate.evaluate_at(&msg(&format!("m{i}")), t0 + Duration::from_millis(i * 10));
            assert!(d.is_allowed());
        }
        let d = gate.evaluate_at(&msg("m3"), t0 + Duration::from_millis(100));
        assert_eq!(d.deny_reason(), Some(DenyReason::RateLimited));

        // Window fully elapsed since the oldest retained timestamp
        let d = gate.evaluate_at(&msg("m4"), t0 + Duration::from_millis(5_000));
        assert!(d.is_allowed());
    }

    #[test]
    fn test_spam_limit_th_repeat_is_denied() {
        let config = AdmissionConfig::strict();
        let mut gate = AdmissionGate::new(&config);
        let t0 = Instant::now();

        assert!(gate.evaluate_at(&msg("hey"), t0).is_allowed());
        assert!(gate.evaluate_at(&msg("other"), t0).is_allowed());
        assert!(gate.evaluate_at(&msg("hey"), t0).is_allowed());
        assert_eq!(
            gate.evaluate_at(&msg("hey"), t0).deny_reason(),
            Some(DenyReason::SpamDetected)
        );
    }

    #[test]
    fn test_missing_subject_skips_rate_and_spam() {
        let config = AdmissionConfig {
            rate_limit: 1,
            spam_limit: 1,
            ..AdmissionConfig::default()
        };
        let mut gate = AdmissionGate::new(&config);
        let event = AdmissionEvent {
            kind: EventKind::Message,
            token: token(),
            subject_id: None,
            channel_id: Some("c1".to_string()),
            message: Some("spam".to_string()),
            source: src(),
        };
        for _ in 0..10 {
            assert!(gate.evaluate(&event).is_allowed());
        }
        assert_eq!(gate.tracked_keys(), (0, 0));
    }

    #[test]
    fn test_connection_cap_and_release() {
        let mut gate = AdmissionGate::new(&AdmissionConfig::default());
        let mut held = Vec::new();
        for _ in 0..5 {
            match gate.evaluate(&AdmissionEvent::connect(src(), token())) {
                Decision::Allow(admission) => held.push(admission.into_guard().unwrap()),
                Decision::Deny(reason) => panic!("unexpected deny: {reason}"),
            }
        }
        let sixth = gate.evaluate(&AdmissionEvent::connect(src(), token()));
        assert_eq!(sixth.deny_reason(), Some(DenyReason::TooManyConnections));

        held.remove(2);
        assert!(gate.evaluate(&AdmissionEvent::connect(src(), token())).is_allowed());
    }

    #[test]
    fn test_messages_do_not_take_connection_slots() {
        let config = AdmissionConfig {
            max_connections_per_source: 1,
            ..AdmissionConfig::default()
        };
        let mut gate = AdmissionGate::new(&config);
        let _conn = gate.evaluate(&AdmissionEvent::connect(src(), token()));
        assert!(gate.evaluate(&msg("hello")).is_allowed());
        assert_eq!(gate.connections().count(&src()), 1);
    }
}
