use thiserror::Error;

/// Failures of the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("bit with id {0} not found")]
    NotFound(String),
    /// The backing storage could not be read or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures surfaced while handling a single inbound frame or outbound send.
///
/// None of these are fatal to the server; the caller logs them and keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The frame matched no known message shape.
    #[error("invalid message: {0}")]
    Validation(String),
    #[error("bit with id {0} not found")]
    NotFound(String),
    #[error("store failure: {0}")]
    Store(String),
    /// Sending to a connection failed; the connection has been dropped.
    #[error("failed to send to connection {0}")]
    Transport(u64),
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => SyncError::NotFound(id),
            StoreError::Unavailable(reason) => SyncError::Store(reason),
        }
    }
}
