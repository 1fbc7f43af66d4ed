//! Error types for transfer operations

use thiserror::Error;
use uuid::Uuid;

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transfer errors
///
/// Every facade operation reports exactly one of these synchronously; a
/// failed operation never leaves a partially mutated record behind.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input, including a fulfillment that fails to parse
    #[error("Invalid fields: {0}")]
    InvalidFields(String),

    /// A transfer with this id already exists with conflicting content
    #[error("Duplicate transfer id: {0}")]
    DuplicateId(Uuid),

    /// No transfer known under this id
    #[error("Transfer not found: {0}")]
    TransferNotFound(Uuid),

    /// Transfer exists but has not been fulfilled yet
    #[error("Missing fulfillment for transfer: {0}")]
    MissingFulfillment(Uuid),

    /// Operation disallowed in the current state, by the caller's role,
    /// or because the fulfillment does not satisfy the condition
    #[error("Not accepted: {0}")]
    NotAccepted(String),

    /// Operation already completed successfully for this transfer
    #[error("Already completed: {0}")]
    Repeat(String),

    /// Plugin is not connected to the ledger
    #[error("Plugin not connected")]
    NotConnected,

    /// Concurrency error (relay mailbox closed, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
