//! gatewatch-core: admission control and background reconnaissance for the
//! gatewatch connection gateway.
//!
//! Provides the bounded sliding-window store, IPv4 address arithmetic, the
//! admission gate, the probe backend abstraction, the scanner engine with its
//! status surface, the gateway façade tying them together, and HMAC bearer
//! tokens.

pub mod admission;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ipv4;
pub mod probe;
pub mod scanner;
pub mod token;
pub mod window;

// Re-export commonly used items at crate root.
pub use admission::{AdmissionEvent, AdmissionGate, Decision, DenyReason, EventKind};
pub use config::{AdmissionConfig, ScannerConfig};
pub use error::{GatewatchError, ProbeError, Result, ScanError};
pub use gateway::Gateway;
pub use probe::{FakeProbe, ProbeBackend, SystemProbe};
pub use scanner::{ScanStatus, Scanner};
pub use token::{create_token, verify_token};
