//! Error types for the message bus

use thiserror::Error;

/// Errors that can occur within the message bus.
#[derive(Error, Debug)]
pub enum MessageBusError {
    /// Failed to deliver a message to one or more subscribers
    #[error("Failed to send message: {reason}")]
    SendFailed { reason: String },
}

/// Result type for message bus operations.
pub type MessageBusResult<T> = Result<T, MessageBusError>;

/// Errors for receiving with a timeout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecvTimeoutError {
    #[error("Timeout while waiting for message")]
    Timeout,
    #[error("Channel disconnected")]
    Disconnected,
}

/// Errors for non-blocking reception.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("No message available")]
    Empty,
    #[error("Channel disconnected")]
    Disconnected,
}
