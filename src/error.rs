//! Error types for emberkv
//!
//! One error type covers the client contract and the engine underneath it.
//! Engine failures (`Io`, `WalCorruption`, `Storage`, ...) pass through to the
//! caller unchanged; the only reinterpretation is a read miss, which always
//! surfaces as [`EmberError::NotFound`].

use thiserror::Error;

/// Result type alias using EmberError
pub type Result<T> = std::result::Result<T, EmberError>;

/// Unified error type for emberkv operations
#[derive(Debug, Error)]
pub enum EmberError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    /// Another open handle holds the store's lock file
    #[error("Store is locked: {0}")]
    Locked(String),

    #[error("NotFound")]
    NotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Construction / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Contract Errors
    // -------------------------------------------------------------------------
    /// Operation attempted in the wrong lifecycle state
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Runtime Errors
    // -------------------------------------------------------------------------
    /// A blocking engine task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl EmberError {
    /// True for a normalized read miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, EmberError::NotFound)
    }
}
