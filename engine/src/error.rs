//! Error types for the Sojourn engine.

use crate::{remote::RemoteStoreError, store::StoreError, EventId};
use thiserror::Error;

/// All possible errors from the Sojourn engine.
#[derive(Debug, Error)]
pub enum Error {
    // Validation errors - rejected before any write
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid event kind: {0:?}")]
    InvalidKind(String),

    #[error("validation failed: {0}")]
    Validation(String),

    // Mutation errors
    #[error("event not found: {0}")]
    NotFound(EventId),

    #[error("event already exists: {0}")]
    AlreadyExists(EventId),

    #[error("mutation requires an owning identity")]
    AuthRequired,

    // Collaborator errors - transient, retried by the next flush
    #[error("local store: {0}")]
    Store(#[from] StoreError),

    #[error("remote store: {0}")]
    Remote(#[from] RemoteStoreError),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    /// Whether the error is a transient collaborator failure that the next
    /// flush pass will retry, as opposed to a caller mistake.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Remote(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::InvalidTimestamp("not-a-date".into());
        assert_eq!(err.to_string(), "invalid timestamp: \"not-a-date\"");

        let err = Error::NotFound("ev-1".into());
        assert_eq!(err.to_string(), "event not found: ev-1");

        let err = Error::AuthRequired;
        assert_eq!(err.to_string(), "mutation requires an owning identity");
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Remote(RemoteStoreError::Unavailable("down".into())).is_transient());
        assert!(!Error::AuthRequired.is_transient());
        assert!(!Error::InvalidKind("ARRIVAL".into()).is_transient());
    }
}
