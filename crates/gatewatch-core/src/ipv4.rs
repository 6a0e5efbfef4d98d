//! IPv4 address arithmetic over the 32-bit integer encoding.
//!
//! Offsets carry across all four octets. At the edges of the address space
//! offsets saturate: `255.255.255.255 + 1` stays `255.255.255.255` and
//! `0.0.0.0 - 1` stays `0.0.0.0`.

use crate::error::ScanError;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Parse dotted-quad text into its integer encoding.
pub fn decode(text: &str) -> Result<u32, ScanError> {
    text.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| ScanError::InvalidAddress(text.to_string()))
}

/// Render an integer encoding as dotted-quad text.
pub fn encode(addr: u32) -> String {
    Ipv4Addr::from(addr).to_string()
}

/// Move `addr` by `delta`, saturating at both ends of the address space.
pub fn offset(addr: u32, delta: i64) -> u32 {
    (addr as i64 + delta).clamp(0, u32::MAX as i64) as u32
}

/// Text form of [`offset`].
pub fn offset_text(text: &str, delta: i64) -> Result<String, ScanError> {
    Ok(encode(offset(decode(text)?, delta)))
}

/// Inclusive range `[base - radius, base + radius]`.
pub fn range_around(base: u32, radius: u32) -> AddrRange {
    AddrRange {
        start: offset(base, -(radius as i64)),
        end: offset(base, radius as i64),
    }
}

/// Pure prefix match of an address's text form against exclusion entries.
pub fn is_excluded(addr_text: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .any(|p| !p.is_empty() && addr_text.starts_with(p.as_str()))
}

/// An inclusive, ascending range of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddrRange {
    pub start: u32,
    pub end: u32,
}

impl AddrRange {
    /// Parse `a.b.c.d`, `a.b.c.d-e.f.g.h` or `a.b.c.d/n`.
    pub fn parse(text: &str) -> Result<Self, ScanError> {
        let text = text.trim();
        let invalid = || ScanError::InvalidRange(text.to_string());

        if let Some((first, last)) = text.split_once('-') {
            let start = decode(first).map_err(|_| invalid())?;
            let end = decode(last).map_err(|_| invalid())?;
            if start > end {
                return Err(invalid());
            }
            return Ok(Self { start, end });
        }

        if let Some((net, bits)) = text.split_once('/') {
            let net = decode(net).map_err(|_| invalid())?;
            let bits: u32 = bits.trim().parse().map_err(|_| invalid())?;
            if bits > 32 {
                return Err(invalid());
            }
            let host_mask = u32::MAX.checked_shr(bits).unwrap_or(0);
            let start = net & !host_mask;
            return Ok(Self {
                start,
                end: start | host_mask,
            });
        }

        let single = decode(text).map_err(|_| invalid())?;
        Ok(Self {
            start: single,
            end: single,
        })
    }

    /// Number of addresses in the range.
    pub fn len(&self) -> u64 {
        self.end as u64 - self.start as u64 + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: u32) -> bool {
        (self.start..=self.end).contains(&addr)
    }

    /// Ascending iterator over every address in the range.
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", encode(self.start))
        } else {
            write!(f, "{}-{}", encode(self.start), encode(self.end))
        }
    }
}
