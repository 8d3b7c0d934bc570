//! Registry error types.

use uuid::Uuid;

/// Errors returned when changing registry membership.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A subscriber with this ID is already registered.
    #[error("Subscriber already registered: {0}")]
    DuplicateId(Uuid),
}

/// Failure to hand a line to one subscriber.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The subscriber's buffer is full; the line was dropped for it.
    #[error("Subscriber buffer full")]
    Lagging,

    /// The subscriber's session is gone.
    #[error("Subscriber disconnected")]
    Disconnected,

    /// The transport rejected the write.
    #[error("Transport error: {0}")]
    Transport(String),
}
