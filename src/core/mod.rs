//! Core engine types.
//!
//! This module contains the pure part of the engine:
//! - State identifiers via the `State` trait
//! - The `Domain` type family and the `Event`/`Payload` bounds
//! - `StateResult`, the outcome of a node visit
//! - Guard predicates for routing
//! - Immutable history tracking
//!
//! Nothing in this module performs I/O.

mod domain;
mod guard;
mod history;
mod result;
mod state;

pub use domain::{BasicEvent, Domain, Event, Payload};
pub use guard::Guard;
pub use history::{History, HistoryEntry};
pub use result::{StateResult, Status};
pub use state::State;
