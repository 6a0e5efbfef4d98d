//! Probe backend: the three network operations the scanner depends on.
//!
//! - **[`system`]**: [`SystemProbe`], the production backend: PTR lookups via
//!   `hickory-resolver`, TCP connect checks, and the system `whois` tool.
//! - **[`fake`]**: [`FakeProbe`], a scripted in-memory backend that drives
//!   the scanner without any network access.
//!
//! Every call can fail with a [`ProbeError`]. The scanner races each call
//! against its own timeout, so a slow backend surfaces as
//! [`ProbeError::Timeout`] rather than stalling the sweep.

pub mod fake;
pub mod system;

pub use crate::error::ProbeError;
pub use fake::FakeProbe;
pub use system::SystemProbe;

use async_trait::async_trait;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Capability interface over reverse DNS, port checks and WHOIS.
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    /// Hostnames bound to `addr` by PTR records.
    ///
    /// Returns [`ProbeError::NotFound`] when the address has no records.
    async fn reverse_lookup(&self, addr: Ipv4Addr) -> Result<Vec<String>, ProbeError>;

    /// Whether `addr:port` accepts a TCP connection within `timeout`.
    async fn port_open(
        &self,
        addr: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<bool, ProbeError>;

    /// Raw WHOIS text for an address or hostname.
    async fn whois(&self, query: &str) -> Result<String, ProbeError>;
}

/// Race `fut` against `limit`; elapsing maps to [`ProbeError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProbeError::Timeout)?
}
