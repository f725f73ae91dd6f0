//! Error types shared between the supervisor and worker sides of buntime.
//!
//! Mirrors the shape of a typical `thiserror`-derived core error enum: one
//! variant per error *kind* the system distinguishes (see §7 of the
//! specification), not per call site.

use thiserror::Error;

/// Result alias used throughout the `buntime` and `buntime-shared` crates.
pub type BuntimeResult<T> = Result<T, BuntimeError>;

/// Errors produced by the transport, policy, and supervisor layers.
#[derive(Debug, Error)]
pub enum BuntimeError {
    /// Invalid policy document, invalid flag combination, or invalid
    /// `--shm-size`. No worker is started.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to create/map shared memory or bind the control socket.
    #[error("transport setup failed: {0}")]
    Transport(String),

    /// A frame failed to encode or decode cleanly.
    #[error("codec error: {0}")]
    Codec(String),

    /// A policy document failed schema or semantic validation.
    #[error("policy invalid: {0}")]
    PolicyInvalid(String),

    /// `READY` was not observed from the worker within the configured
    /// deadline.
    #[error("worker did not become ready within {waited_ms}ms")]
    StartupTimeout { waited_ms: u64 },

    /// An operation was attempted from a supervisor state that forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A ring buffer write did not fit in the remaining capacity.
    #[error("ring buffer full")]
    RingFull,

    /// An underlying I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document failed to parse or serialize.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
