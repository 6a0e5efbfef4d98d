use thiserror::Error;

/// Errors produced by the gatewatch runtime (configuration, transport, I/O).
///
/// Admission denials are not errors; see [`crate::admission::DenyReason`].
#[derive(Debug, Error)]
pub enum GatewatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure of a single probe backend call.
///
/// Every variant is recovered inside the scanner: logged and treated as a miss.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no records found")]
    NotFound,

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("timed out")]
    Timeout,

    #[error("tool invocation failed: {0}")]
    Tool(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the scanner control surface.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, GatewatchError>;
