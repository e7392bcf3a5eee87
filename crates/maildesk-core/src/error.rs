//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    /// Ticket not found.
    #[error("Ticket not found: {0}")]
    TicketNotFound(i64),

    /// Client not found.
    #[error("Client not found: {0}")]
    ClientNotFound(i64),

    /// Message not found.
    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    /// Quote/invoice document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(i64),

    /// Mail transport failed; nothing was persisted.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The message was sent but the follow-up status write failed.
    #[error("Message sent but status update failed: {0}")]
    PartialSend(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
