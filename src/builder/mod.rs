//! Builder API for machine definitions.
//!
//! [`StateMachineBuilder`] assembles and validates a
//! [`MachineDefinition`](crate::machine::MachineDefinition);
//! [`state_enum!`](crate::state_enum) declares the state vocabulary.

pub mod error;
pub mod machine;
pub mod macros;

pub use error::{BuildError, ConfigViolation};
pub use machine::StateMachineBuilder;
