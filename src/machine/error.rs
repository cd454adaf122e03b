//! Driver error types.

use crate::node::NodeError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`StateMachine`](super::StateMachine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node failed; the driver routes this to the error state
    #[error("node for state '{state}' failed: {source}")]
    NodeFailed {
        state: String,
        #[source]
        source: NodeError,
    },

    /// The error state itself failed; nothing is left to route to
    #[error("error state '{state}' failed: {source}")]
    ErrorStateFailed {
        state: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("no node registered for state '{0}'")]
    UnknownState(String),

    #[error("machine has no current state")]
    NotInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Name of the state the error is attributed to, if any.
    pub fn state(&self) -> Option<&str> {
        match self {
            EngineError::NodeFailed { state, .. }
            | EngineError::ErrorStateFailed { state, .. } => Some(state),
            EngineError::UnknownState(state) => Some(state),
            EngineError::NotInitialized | EngineError::Store(_) => None,
        }
    }
}
