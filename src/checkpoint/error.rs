//! Checkpoint error types.

use thiserror::Error;

/// Encoding used for a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Binary,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Errors that can occur while encoding, decoding or checking checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to encode {format} checkpoint: {reason}")]
    Encode { format: Format, reason: String },

    #[error("failed to decode {format} checkpoint: {reason}")]
    Decode { format: Format, reason: String },

    /// Checkpoint was written by an incompatible format version
    #[error("unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid checkpoint: {0}")]
    Invalid(String),
}
