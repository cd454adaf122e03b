//! Macros for ergonomic state declaration.

/// Declare a state enum and implement the `State` trait for it.
///
/// The optional `waiting:` list names the variants that act as the
/// "inner waiting" sentinel when the enum is the vocabulary of a nested
/// automaton.
///
/// # Example
///
/// ```
/// use waypoint::state_enum;
/// use waypoint::core::State;
///
/// state_enum! {
///     pub enum AgentState {
///         Implement,
///         Review,
///         NeedsInput,
///         Done,
///     }
///     waiting: [NeedsInput]
/// }
///
/// assert_eq!(AgentState::Review.name(), "Review");
/// assert!(AgentState::NeedsInput.is_inner_waiting());
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }

        $(waiting: [$($waiting:ident),* $(,)?])?
    ) => {
        $(#[$meta])*
        #[derive(
            Clone,
            PartialEq,
            Eq,
            Hash,
            Debug,
            serde::Serialize,
            serde::Deserialize
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }

            fn is_inner_waiting(&self) -> bool {
                match self {
                    $($(Self::$waiting => true,)*)?
                    #[allow(unreachable_patterns)]
                    _ => false,
                }
            }
        }
    };
}
