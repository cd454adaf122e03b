//! Checkpoint and resume functionality.
//!
//! A checkpoint is the complete state of one automaton instance: what the
//! persistence collaborator writes and reads, and what a flow node carries
//! in its scratchpad to resume a paused nested automaton.

use crate::core::{Domain, History};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{CheckpointError, Format};

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Metadata tracked by the store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineMetadata {
    /// When the instance was created
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,

    /// Committed transitions
    pub transitions: u64,

    /// Rollback-guarded operations that were restored
    pub rollbacks: u64,

    /// Failed attempts that were retried
    pub retries: u64,
}

impl Default for MachineMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            transitions: 0,
            rollbacks: 0,
            retries: 0,
        }
    }
}

/// A failure the driver redirected to the error state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Name of the state whose node failed
    pub state: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Serializable snapshot of an automaton instance.
/// Does NOT include node definitions (not serializable).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Checkpoint<D: Domain> {
    /// Checkpoint format version
    pub version: u32,

    /// Instance the checkpoint belongs to
    pub instance_id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Explicit current state, if one was set
    pub current_state: Option<D::State>,

    pub context: D::Context,

    pub scratchpad: Option<D::Scratchpad>,

    /// Events awaiting processing, oldest first
    pub pending: Vec<D::Event>,

    /// Complete transition history
    pub history: History<D>,

    /// Last failure routed to the error state
    pub last_failure: Option<FailureRecord>,

    pub metadata: MachineMetadata,
}

impl<D: Domain> Checkpoint<D> {
    /// Serialize to human-readable JSON.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self).map_err(|e| CheckpointError::Encode {
            format: Format::Json,
            reason: e.to_string(),
        })
    }

    /// Deserialize from JSON, rejecting unsupported versions.
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json).map_err(|e| CheckpointError::Decode {
            format: Format::Json,
            reason: e.to_string(),
        })?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Serialize to a compact binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::Encode {
            format: Format::Binary,
            reason: e.to_string(),
        })
    }

    /// Deserialize from the binary form, rejecting unsupported versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes).map_err(|e| CheckpointError::Decode {
            format: Format::Binary,
            reason: e.to_string(),
        })?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Check the format version and basic invariants.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.instance_id.is_empty() {
            return Err(CheckpointError::Invalid("instance id is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BasicEvent, HistoryEntry};
    use crate::state_enum;

    state_enum! {
        enum Step {
            Draft,
            Review,
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Docs;

    impl Domain for Docs {
        type State = Step;
        type Context = Vec<String>;
        type Scratchpad = u32;
        type Event = BasicEvent;
    }

    fn sample() -> Checkpoint<Docs> {
        let history = History::new().record(HistoryEntry {
            state: Step::Review,
            context: vec!["intro".to_string()],
            scratchpad: Some(3),
            events: vec![BasicEvent::with_id("e1", "submit")],
            timestamp: Utc::now(),
        });

        Checkpoint {
            version: CHECKPOINT_VERSION,
            instance_id: "doc-1".to_string(),
            timestamp: Utc::now(),
            current_state: Some(Step::Review),
            context: vec!["intro".to_string()],
            scratchpad: Some(4),
            pending: vec![BasicEvent::with_id("e2", "comment").payload("typo")],
            history,
            last_failure: None,
            metadata: MachineMetadata::default(),
        }
    }

    #[test]
    fn json_round_trip_preserves_state() {
        let checkpoint = sample();
        let restored = Checkpoint::<Docs>::from_json(&checkpoint.to_json().unwrap()).unwrap();
        assert_eq!(restored, checkpoint);
    }

    #[test]
    fn binary_round_trip_preserves_state() {
        let checkpoint = sample();
        let restored = Checkpoint::<Docs>::from_bytes(&checkpoint.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, checkpoint);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut checkpoint = sample();
        checkpoint.version = CHECKPOINT_VERSION + 1;
        let json = serde_json::to_string(&checkpoint).unwrap();

        let result = Checkpoint::<Docs>::from_json(&json);

        assert!(matches!(
            result,
            Err(CheckpointError::UnsupportedVersion { found, supported })
                if found == CHECKPOINT_VERSION + 1 && supported == CHECKPOINT_VERSION
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result = Checkpoint::<Docs>::from_json("{ not json");
        assert!(matches!(
            result,
            Err(CheckpointError::Decode {
                format: Format::Json,
                ..
            })
        ));
    }

    #[test]
    fn empty_instance_id_fails_validation() {
        let mut checkpoint = sample();
        checkpoint.instance_id.clear();
        assert!(matches!(
            checkpoint.validate(),
            Err(CheckpointError::Invalid(_))
        ));
    }
}
