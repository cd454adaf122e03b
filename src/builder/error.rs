//! Build errors for machine definitions.

use thiserror::Error;

/// One problem with a machine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigViolation {
    #[error("initial state '{0}' has no node")]
    InitialWithoutNode(String),

    #[error("error state '{0}' has no node")]
    ErrorStateWithoutNode(String),

    #[error("initial state '{0}' cannot also be the error state")]
    ErrorStateIsInitial(String),

    #[error("max_transitions must be at least 1")]
    ZeroTransitionBudget,
}

/// Errors that can occur when building a machine definition.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("Error state not specified. Call .error_state(state) before .build()")]
    MissingErrorState,

    #[error("No nodes registered. Add at least one with .node(state, node)")]
    NoNodes,

    #[error("invalid machine configuration: {}", list(.0))]
    Invalid(Vec<ConfigViolation>),
}

fn list(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuildError {
    /// Every violation found, empty for the fail-fast variants.
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            BuildError::Invalid(violations) => violations,
            _ => &[],
        }
    }
}
