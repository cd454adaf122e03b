//! Core State trait for state machine states.
//!
//! All state machine states must implement this trait, which provides
//! pure methods for inspecting state properties without side effects.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for state machine state identifiers.
///
/// States are a closed set of identifiers (usually a fieldless enum). The
/// driver keys its node mapping by state, so states must be hashable.
///
/// # Required Traits
///
/// - `Clone`: States are copied into history entries
/// - `Eq` + `Hash`: States key the driver's node mapping
/// - `Debug`: States must be debuggable for diagnostics
/// - `Serialize` + `Deserialize`: States must be serializable for persistence
///
/// # Example
///
/// ```rust
/// use waypoint::core::State;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum ReviewState {
///     Implement,
///     Test,
///     AwaitingHuman,
///     Done,
/// }
///
/// impl State for ReviewState {
///     fn name(&self) -> &str {
///         match self {
///             Self::Implement => "Implement",
///             Self::Test => "Test",
///             Self::AwaitingHuman => "AwaitingHuman",
///             Self::Done => "Done",
///         }
///     }
///
///     fn is_inner_waiting(&self) -> bool {
///         matches!(self, Self::AwaitingHuman)
///     }
/// }
/// ```
pub trait State:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the state's name for display/logging.
    fn name(&self) -> &str;

    /// Check if this state is the "inner waiting" sentinel.
    ///
    /// When a nested automaton stops in a sentinel state, the flow node
    /// that drives it reports `Waiting` to its parent regardless of the
    /// status the nested `resume` returned.
    ///
    /// Default implementation returns `false`.
    fn is_inner_waiting(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum TestState {
        Initial,
        Processing,
        Paused,
    }

    impl State for TestState {
        fn name(&self) -> &str {
            match self {
                Self::Initial => "Initial",
                Self::Processing => "Processing",
                Self::Paused => "Paused",
            }
        }

        fn is_inner_waiting(&self) -> bool {
            matches!(self, Self::Paused)
        }
    }

    #[test]
    fn state_name_returns_correct_value() {
        assert_eq!(TestState::Initial.name(), "Initial");
        assert_eq!(TestState::Processing.name(), "Processing");
        assert_eq!(TestState::Paused.name(), "Paused");
    }

    #[test]
    fn inner_waiting_identifies_sentinel() {
        assert!(!TestState::Initial.is_inner_waiting());
        assert!(!TestState::Processing.is_inner_waiting());
        assert!(TestState::Paused.is_inner_waiting());
    }

    #[test]
    fn state_serializes_correctly() {
        let state = TestState::Processing;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: TestState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }

    #[test]
    fn state_keys_a_map() {
        let mut map = std::collections::HashMap::new();
        map.insert(TestState::Initial, 1);
        map.insert(TestState::Paused, 2);

        assert_eq!(map.get(&TestState::Initial), Some(&1));
        assert_eq!(map.get(&TestState::Processing), None);
    }
}
