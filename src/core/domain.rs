//! Type family binding the caller-defined types of one automaton.

use super::state::State;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Opaque caller-defined value carried by the engine (context, scratchpad).
///
/// Blanket-implemented for every type with the required bounds; the engine
/// never inspects payloads, it only clones them for snapshots and history.
pub trait Payload:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Payload for T where
    T: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// An incoming event. Events carry an identifier and a type tag.
///
/// The identifier is used for removal by identity, the type tag for
/// type-filtered dequeue.
pub trait Event: Payload {
    fn id(&self) -> &str;

    fn event_type(&self) -> &str;
}

/// The four caller-defined types of one automaton.
///
/// Every engine type (`SharedStore`, `Node`, `StateMachine`, ...) is generic
/// over a single `Domain`, so a nested automaton with its own vocabulary is
/// just a second `Domain`.
///
/// # Example
///
/// ```rust
/// use waypoint::core::{BasicEvent, Domain};
/// use waypoint::state_enum;
///
/// state_enum! {
///     pub enum Phase {
///         Draft,
///         Published,
///     }
/// }
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Blog;
///
/// impl Domain for Blog {
///     type State = Phase;
///     type Context = Vec<String>;
///     type Scratchpad = String;
///     type Event = BasicEvent;
/// }
/// ```
pub trait Domain: Clone + Debug + PartialEq + Send + Sync + 'static {
    type State: State;
    type Context: Payload;
    type Scratchpad: Payload;
    type Event: Event;
}

/// General-purpose event with a string payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicEvent {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: Option<String>,
}

impl BasicEvent {
    /// Create an event with a fresh random identifier.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            payload: None,
        }
    }

    /// Create an event with a caller-chosen identifier.
    pub fn with_id(id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload: None,
        }
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

impl Event for BasicEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_events_get_distinct_ids() {
        let a = BasicEvent::new("tick");
        let b = BasicEvent::new("tick");

        assert_ne!(a.id(), b.id());
        assert_eq!(a.event_type(), "tick");
    }

    #[test]
    fn payload_is_optional_on_the_wire() {
        let event: BasicEvent =
            serde_json::from_str(r#"{"id":"e1","event_type":"start"}"#).unwrap();

        assert_eq!(event, BasicEvent::with_id("e1", "start"));
    }
}
