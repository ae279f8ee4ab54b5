//! Error handling for the ledger node
//!
//! This module provides the error types for all ledger operations.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error types for ledger operations
#[derive(Debug, Clone)]
pub enum LedgerError {
    /// Malformed input to a public operation - rejected, no state change
    Validation(String),
    /// Candidate block failed chain-linkage/PoW/hash checks
    RejectedBlock(String),
    /// Unknown id or address
    NotFound(String),
    /// Tampered or truncated at-rest ciphertext
    CorruptCiphertext(String),
    /// Key material could not be read or parsed
    KeyLoad(String),
    /// Encryption operation errors
    Encryption(String),
    /// Network failure talking to a single peer
    PeerUnavailable(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Persistent storage errors
    Storage(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Validation(msg) => write!(f, "Validation error: {msg}"),
            LedgerError::RejectedBlock(msg) => write!(f, "Rejected block: {msg}"),
            LedgerError::NotFound(msg) => write!(f, "Not found: {msg}"),
            LedgerError::CorruptCiphertext(msg) => write!(f, "Corrupt ciphertext: {msg}"),
            LedgerError::KeyLoad(msg) => write!(f, "Key load error: {msg}"),
            LedgerError::Encryption(msg) => write!(f, "Encryption error: {msg}"),
            LedgerError::PeerUnavailable(msg) => write!(f, "Peer unavailable: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Storage(msg) => write!(f, "Storage error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
