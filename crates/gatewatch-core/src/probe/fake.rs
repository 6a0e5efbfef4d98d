use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::*;

/// How a scripted lookup should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Return [`ProbeError::Timeout`] immediately.
    Timeout,
    /// Return [`ProbeError::Lookup`].
    Lookup,
    /// Never answer; only the caller's timeout ends the call.
    Hang,
}

/// Per-address call counters recorded by [`FakeProbe`].
#[derive(Debug, Default, Clone)]
pub struct FakeCalls {
    pub reverse: HashMap<Ipv4Addr, usize>,
    pub port: HashMap<Ipv4Addr, usize>,
    pub whois: Vec<String>,
}

/// A scripted probe backend for tests. Answers from in-memory tables and
/// counts every call.
#[derive(Debug, Default)]
pub struct FakeProbe {
    hosts: HashMap<Ipv4Addr, Vec<String>>,
    open_ports: HashSet<(Ipv4Addr, u16)>,
    lookup_failures: HashMap<Ipv4Addr, FakeFailure>,
    port_failures: HashMap<Ipv4Addr, FakeFailure>,
    whois_text: Option<String>,
    calls: Mutex<FakeCalls>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// PTR records for `addr`.
    pub fn with_host(mut self, addr: Ipv4Addr, names: &[&str]) -> Self {
        self.hosts
            .insert(addr, names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_open_port(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.open_ports.insert((addr, port));
        self
    }

    pub fn with_lookup_failure(mut self, addr: Ipv4Addr, failure: FakeFailure) -> Self {
        self.lookup_failures.insert(addr, failure);
        self
    }

    pub fn with_port_failure(mut self, addr: Ipv4Addr, failure: FakeFailure) -> Self {
        self.port_failures.insert(addr, failure);
        self
    }

    pub fn with_whois(mut self, text: impl Into<String>) -> Self {
        self.whois_text = Some(text.into());
        self
    }

    /// Snapshot of all calls made so far.
    pub fn calls(&self) -> FakeCalls {
        self.lock().clone()
    }

    pub fn reverse_calls(&self, addr: Ipv4Addr) -> usize {
        self.lock().reverse.get(&addr).copied().unwrap_or(0)
    }

    pub fn port_calls(&self, addr: Ipv4Addr) -> usize {
        self.lock().port.get(&addr).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeCalls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn fail(failure: FakeFailure) -> ProbeError {
    match failure {
        FakeFailure::Timeout => ProbeError::Timeout,
        FakeFailure::Lookup => ProbeError::Lookup("scripted failure".to_string()),
        FakeFailure::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ProbeError::Timeout
        }
    }
}

#[async_trait]
impl ProbeBackend for FakeProbe {
    async fn reverse_lookup(&self, addr: Ipv4Addr) -> Result<Vec<String>, ProbeError> {
        *self.lock().reverse.entry(addr).or_insert(0) += 1;
        if let Some(failure) = self.lookup_failures.get(&addr) {
            return Err(fail(*failure).await);
        }
        self.hosts.get(&addr).cloned().ok_or(ProbeError::NotFound)
    }

    async fn port_open(
        &self,
        addr: Ipv4Addr,
        port: u16,
        _timeout: Duration,
    ) -> Result<bool, ProbeError> {
        *self.lock().port.entry(addr).or_insert(0) += 1;
        if let Some(failure) = self.port_failures.get(&addr) {
            return Err(fail(*failure).await);
        }
        Ok(self.open_ports.contains(&(addr, port)))
    }

    async fn whois(&self, query: &str) -> Result<String, ProbeError> {
        self.lock().whois.push(query.to_string());
        self.whois_text
            .clone()
            .ok_or_else(|| ProbeError::Tool("whois not scripted".to_string()))
    }
}
