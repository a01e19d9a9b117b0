//! Error types for evalwire.

use thiserror::Error;

/// Main error type for all bridge operations.
///
/// Evaluation failures are deliberately absent: the engine reporting an
/// error for a piece of source text is a normal reply
/// ([`EvalOutcome::Failure`](crate::engine::EvalOutcome)), not a bridge
/// error.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error on the listening socket or a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port 0 is not a bindable REPL port.
    #[error("invalid port: 0")]
    InvalidPort,

    /// `start_listening` called while already listening.
    #[error("already listening on port {0}")]
    AlreadyListening(u16),

    /// Binding the listening socket failed (port in use, permissions).
    #[error("failed to bind port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying bind error.
        source: std::io::Error,
    },

    /// Malformed or oversized frame on a connection.
    #[error("frame error: {0}")]
    Frame(String),

    /// The reply queue for a connection is gone (writer task ended).
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
