//! Waypoint: a persistable state machine execution engine
//!
//! Waypoint runs event-driven automata whose complete state (context,
//! scratchpad, pending events, history) lives in a shared store that can be
//! persisted and restored at any step. Each state has a node that runs in
//! three phases; the driver moves between states until the automaton waits
//! for more events or terminates.
//!
//! # Core Concepts
//!
//! - **Domain**: The four caller types of one automaton (state, context, scratchpad, event)
//! - **Shared store**: Per-instance state with rollback, retry and persistence
//! - **Nodes**: `prepare` / `execute` / `finalize` work attached to a state
//! - **Driver**: Runs nodes, records history, routes failures to the error state
//! - **Flow nodes**: A nested automaton as the work of one state
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use waypoint::core::{BasicEvent, Domain, Status, StateResult};
//! use waypoint::node::{ErrorNode, Executed, FinalNode, Node, NodeError, Prepared};
//! use waypoint::state_enum;
//! use waypoint::store::SharedStore;
//! use waypoint::StateMachineBuilder;
//!
//! state_enum! {
//!     pub enum Job {
//!         Queued,
//!         Done,
//!         Failed,
//!     }
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Jobs;
//!
//! impl Domain for Jobs {
//!     type State = Job;
//!     type Context = u32;
//!     type Scratchpad = ();
//!     type Event = BasicEvent;
//! }
//!
//! struct RunJob;
//!
//! #[async_trait]
//! impl Node<Jobs> for RunJob {
//!     type Args = ();
//!     type Output = usize;
//!
//!     async fn prepare(&self, store: &SharedStore<Jobs>) -> Result<Prepared<Jobs, ()>, NodeError> {
//!         Ok(Prepared::new(()).with_events(store.get_by_type("run")))
//!     }
//!
//!     async fn execute(
//!         &self,
//!         _args: (),
//!         events: Vec<BasicEvent>,
//!         scratchpad: Option<()>,
//!     ) -> Result<Executed<Jobs, usize>, NodeError> {
//!         Ok(Executed::new(events.len(), scratchpad))
//!     }
//!
//!     async fn finalize(
//!         &self,
//!         runs: usize,
//!         store: &mut SharedStore<Jobs>,
//!     ) -> Result<StateResult<Jobs>, NodeError> {
//!         if runs == 0 {
//!             return Ok(StateResult::waiting());
//!         }
//!         store.update_context(|n| n + runs as u32);
//!         Ok(StateResult::transition(Job::Done))
//!     }
//! }
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let mut machine = StateMachineBuilder::<Jobs>::new()
//!     .initial(Job::Queued)
//!     .error_state(Job::Failed)
//!     .node(Job::Queued, RunJob)
//!     .node(Job::Done, FinalNode::<Jobs>::new())
//!     .node(Job::Failed, ErrorNode::<Jobs>::new())
//!     .build_machine(SharedStore::builder("job-1", 0).build())
//!     .unwrap();
//!
//! let idle = machine.resume(vec![]).await.unwrap();
//! assert_eq!(idle.status, Status::Waiting);
//!
//! let done = machine.resume(vec![BasicEvent::new("run")]).await.unwrap();
//! assert_eq!(done.status, Status::Terminal);
//! assert_eq!(*machine.store().context(), 1);
//! # });
//! ```

pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod machine;
pub mod node;
pub mod observe;
pub mod store;

// Re-export commonly used types
pub use builder::{BuildError, StateMachineBuilder};
pub use checkpoint::Checkpoint;
pub use core::{BasicEvent, Domain, Event, Guard, State, StateResult, Status};
pub use machine::{EngineError, MachineDefinition, Outcome, StateMachine};
pub use node::{Node, NodeError};
pub use store::SharedStore;
