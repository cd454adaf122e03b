//! Store error types.

use crate::checkpoint::CheckpointError;
use thiserror::Error;

/// Errors raised by a persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend failed to read or write
    #[error("storage error: {0}")]
    Storage(String),

    /// A lock guarding in-memory state was poisoned
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// Errors from shared store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence failed for instance '{instance_id}': {source}")]
    Persistence {
        instance_id: String,
        #[source]
        source: PersistenceError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A rollback token was closed out of order
    #[error("rollback token {found} does not match the innermost frame {expected}")]
    RollbackMismatch { expected: u64, found: u64 },

    #[error("no rollback-guarded operation is in flight")]
    NoActiveRollback,
}

impl StoreError {
    /// Returns whether the error came from the persistence collaborator.
    pub fn is_persistence(&self) -> bool {
        matches!(self, StoreError::Persistence { .. })
    }
}
