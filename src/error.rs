//! Error types for the Things game client.
//!
//! Server-side rejections are not errors at this level: they arrive as
//! ordinary `error` events and surface through the session status message.

use thiserror::Error;

/// Errors that can occur when using the Things game client.
#[derive(Debug, Error)]
pub enum ThingsClientError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a game operation but the client has no active session.
    #[error("no active game session")]
    NotInGame,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Things game client operations.
pub type Result<T> = std::result::Result<T, ThingsClientError>;
