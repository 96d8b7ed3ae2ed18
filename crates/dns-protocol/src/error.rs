//! Error types for DNS message handling.

use thiserror::Error;

/// Result type alias using ProtocolError.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing input lines or handling wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // === Input Errors ===
    #[error("invalid format, want \"Domain Qtype [Subnet]\", got: {0:?}")]
    InvalidFormat(String),

    #[error("invalid Qtype: {0:?}")]
    UnknownType(String),

    #[error("invalid domain name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid subnet address: {0:?}")]
    InvalidSubnet(String),

    // === Wire Errors ===
    #[error("message too short: {len} bytes, need at least {need}")]
    ShortMessage { len: usize, need: usize },

    #[error("malformed message: {0}")]
    Malformed(String),
}
