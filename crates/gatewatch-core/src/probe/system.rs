//! Production probe backend.
//!
//! Reverse DNS goes through `hickory-resolver` using the system resolver
//! configuration, port checks are plain TCP connects, and WHOIS shells out
//! to the `whois` tool.

use super::{ProbeBackend, ProbeError};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, warn};

/// Probe backend backed by the host's resolver, TCP stack and tools.
pub struct SystemProbe {
    resolver: TokioAsyncResolver,
    whois_program: String,
}

impl SystemProbe {
    /// Build from `/etc/resolv.conf` (or the platform equivalent), falling
    /// back to the resolver defaults when the system config is unreadable.
    pub fn new() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "system resolver config unavailable, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self {
            resolver,
            whois_program: "whois".to_string(),
        }
    }

    /// Use a different WHOIS executable.
    pub fn with_whois_program(mut self, program: impl Into<String>) -> Self {
        self.whois_program = program.into();
        self
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeBackend for SystemProbe {
    async fn reverse_lookup(&self, addr: Ipv4Addr) -> Result<Vec<String>, ProbeError> {
        match self.resolver.reverse_lookup(IpAddr::V4(addr)).await {
            Ok(lookup) => {
                let names: Vec<String> = lookup
                    .iter()
                    .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
                    .collect();
                if names.is_empty() {
                    Err(ProbeError::NotFound)
                } else {
                    Ok(names)
                }
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Err(ProbeError::NotFound),
                ResolveErrorKind::Timeout => Err(ProbeError::Timeout),
                _ => Err(ProbeError::Lookup(e.to_string())),
            },
        }
    }

    async fn port_open(
        &self,
        addr: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<bool, ProbeError> {
        let target = SocketAddr::from((addr, port));
        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Err(_) => Err(ProbeError::Timeout),
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Ok(false),
            Ok(Err(e)) => Err(ProbeError::Io(e)),
        }
    }

    async fn whois(&self, query: &str) -> Result<String, ProbeError> {
        let output = Command::new(&self.whois_program)
            .arg(query)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Tool(format!("{} not runnable: {e}", self.whois_program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Tool(format!(
                "{} exited with {}: {}",
                self.whois_program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(query = %query, bytes = text.len(), "whois answered");
        Ok(text)
    }
}
