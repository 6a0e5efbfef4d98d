//! Read-only views of scanner progress.

use crate::ipv4;
use serde::Serialize;

/// Mutable sweep progress, owned by the scanner loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanCursor {
    /// Integer encoding of the address being examined.
    pub current_address: u32,
    /// Current sweep radius around the seed base.
    pub radius: u32,
    /// Position of the current target in the sweep plan.
    pub base_index: usize,
    /// Addresses that reached the reverse-DNS stage.
    pub total_probed: u64,
    /// Consecutive hits since the last miss.
    pub hit_streak: u32,
}

impl ScanCursor {
    pub fn new(start: u32, radius: u32) -> Self {
        Self {
            current_address: start,
            radius,
            base_index: 0,
            total_probed: 0,
            hit_streak: 0,
        }
    }
}

/// An address that matched the hostname pattern and had the port open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub address: String,
    pub hostnames: Vec<String>,
    pub port: u16,
    /// Radius after this hit was recorded.
    pub radius: u32,
}

/// Owned snapshot returned by [`super::Scanner::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub current_address: String,
    pub cursor: ScanCursor,
    pub extra_ranges: Vec<String>,
    pub total_probed: u64,
    pub hits: Vec<Hit>,
}

impl ScanStatus {
    pub(crate) fn from_parts(
        is_scanning: bool,
        cursor: &ScanCursor,
        extra_ranges: Vec<String>,
        hits: Vec<Hit>,
    ) -> Self {
        Self {
            is_scanning,
            current_address: ipv4::encode(cursor.current_address),
            cursor: cursor.clone(),
            extra_ranges,
            total_probed: cursor.total_probed,
            hits,
        }
    }
}
