//! Node lifecycle.
//!
//! A node is the unit of work attached to one state. Every visit runs three
//! phases against the shared store:
//!
//! 1. `prepare` inspects the store and picks the events it consumes
//! 2. `execute` does the work and produces a scratchpad
//! 3. `finalize` folds the output into the context and decides what happens next
//!
//! `prepare` and `execute` are retried under the store's policy. The three
//! phases run inside one rollback frame, so a failure leaves the store as it
//! was before the visit.

mod flow;
mod variants;

pub use flow::{FlowArgs, FlowNode, FlowOutcome, NestedScratchpad};
pub use variants::{Diagnostic, ErrorNode, FinalNode, NoopNode, Reporter};

use crate::core::{Domain, State, StateResult};
use crate::machine::EngineError;
use crate::observe::{EngineEvent, Observer, Phase};
use crate::store::{SharedStore, StoreError};
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use thiserror::Error;

/// Errors raised by node phases.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A nested automaton failed
    #[error("nested automaton failed: {0}")]
    Nested(Box<EngineError>),
}

impl NodeError {
    pub fn msg(message: impl Display) -> Self {
        NodeError::Failed(message.to_string())
    }
}

/// What `prepare` hands to `execute`.
#[derive(Clone, Debug, PartialEq)]
pub struct Prepared<D: Domain, A> {
    /// Events this visit consumes; removed from the queue once prepare succeeds
    pub events: Vec<D::Event>,
    pub args: A,
}

impl<D: Domain, A> Prepared<D, A> {
    /// Consume no events.
    pub fn new(args: A) -> Self {
        Self {
            events: Vec::new(),
            args,
        }
    }

    pub fn with_events(mut self, events: Vec<D::Event>) -> Self {
        self.events = events;
        self
    }
}

/// What `execute` hands to `finalize`.
#[derive(Clone, Debug, PartialEq)]
pub struct Executed<D: Domain, O> {
    pub output: O,
    /// Written back to the store before `finalize` runs
    pub scratchpad: Option<D::Scratchpad>,
}

impl<D: Domain, O> Executed<D, O> {
    pub fn new(output: O, scratchpad: Option<D::Scratchpad>) -> Self {
        Self { output, scratchpad }
    }
}

/// Work attached to one state.
///
/// Nodes are stateless: one instance serves every visit of its state, for
/// every automaton instance sharing the definition.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use waypoint::core::{BasicEvent, Domain, StateResult};
/// use waypoint::node::{Executed, Node, NodeError, Prepared};
/// use waypoint::state_enum;
/// use waypoint::store::SharedStore;
///
/// state_enum! {
///     pub enum Stage { Count, Done }
/// }
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Counter;
///
/// impl Domain for Counter {
///     type State = Stage;
///     type Context = u32;
///     type Scratchpad = u32;
///     type Event = BasicEvent;
/// }
///
/// struct CountTicks;
///
/// #[async_trait]
/// impl Node<Counter> for CountTicks {
///     type Args = ();
///     type Output = u32;
///
///     async fn prepare(&self, store: &SharedStore<Counter>) -> Result<Prepared<Counter, ()>, NodeError> {
///         Ok(Prepared::new(()).with_events(store.get_by_type("tick")))
///     }
///
///     async fn execute(
///         &self,
///         _args: (),
///         events: Vec<BasicEvent>,
///         _scratchpad: Option<u32>,
///     ) -> Result<Executed<Counter, u32>, NodeError> {
///         let ticks = events.len() as u32;
///         Ok(Executed::new(ticks, Some(ticks)))
///     }
///
///     async fn finalize(
///         &self,
///         ticks: u32,
///         store: &mut SharedStore<Counter>,
///     ) -> Result<StateResult<Counter>, NodeError> {
///         store.update_context(|total| total + ticks);
///         Ok(StateResult::transition(Stage::Done))
///     }
/// }
/// ```
#[async_trait]
pub trait Node<D: Domain>: Send + Sync + 'static {
    type Args: Clone + Send + Sync;
    type Output: Send;

    /// Inspect the store and select the events to consume. Must not have
    /// side effects: it may run several times.
    async fn prepare(&self, store: &SharedStore<D>) -> Result<Prepared<D, Self::Args>, NodeError>;

    /// Do the work. May run several times.
    async fn execute(
        &self,
        args: Self::Args,
        events: Vec<D::Event>,
        scratchpad: Option<D::Scratchpad>,
    ) -> Result<Executed<D, Self::Output>, NodeError>;

    /// Fold the output into the context and pick the outcome.
    async fn finalize(
        &self,
        output: Self::Output,
        store: &mut SharedStore<D>,
    ) -> Result<StateResult<D>, NodeError>;

    /// Turn a failure into an outcome. The store has already been restored
    /// when this runs. `None` propagates the failure.
    async fn on_error(
        &self,
        _error: &NodeError,
        _store: &mut SharedStore<D>,
    ) -> Result<Option<StateResult<D>>, NodeError> {
        Ok(None)
    }
}

/// Result of one node visit.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeRun<D: Domain> {
    pub result: StateResult<D>,
    /// Events consumed by the visit
    pub events: Vec<D::Event>,
}

/// Object-safe view of a [`Node`], used by the driver's node map.
#[async_trait]
pub trait Runnable<D: Domain>: Send + Sync {
    async fn run(&self, state: &D::State, store: &mut SharedStore<D>)
        -> Result<NodeRun<D>, NodeError>;
}

#[async_trait]
impl<D: Domain, N: Node<D>> Runnable<D> for N {
    async fn run(
        &self,
        state: &D::State,
        store: &mut SharedStore<D>,
    ) -> Result<NodeRun<D>, NodeError> {
        let token = store.begin_rollback();
        let error = match run_phases(self, state, store).await {
            Ok(run) => {
                store.commit_rollback(token)?;
                return Ok(run);
            }
            Err(error) => error,
        };

        if let Err(restore) = store.abort_rollback(token).await {
            tracing::error!(
                instance_id = store.instance_id(),
                state = state.name(),
                error = %restore,
                "failed to persist state restored after node failure"
            );
        }
        match self.on_error(&error, store).await? {
            Some(result) => Ok(NodeRun {
                result,
                events: Vec::new(),
            }),
            None => Err(error),
        }
    }
}

async fn run_phases<D: Domain, N: Node<D>>(
    node: &N,
    state: &D::State,
    store: &mut SharedStore<D>,
) -> Result<NodeRun<D>, NodeError> {
    let observer = store.observer_handle();
    let instance_id = store.instance_id().to_string();
    let scope = PhaseScope {
        observer: observer.as_ref(),
        instance_id: &instance_id,
        state: state.name(),
    };

    let shared: &SharedStore<D> = store;
    let prepared = scope
        .run(Phase::Prepare, shared.retry(|_| node.prepare(shared), None))
        .await?;
    let Prepared { events, args } = prepared;
    store.remove(&events);

    let scratchpad = store.scratchpad().cloned();
    let shared: &SharedStore<D> = store;
    let executed = scope
        .run(
            Phase::Execute,
            shared.retry(
                |_| node.execute(args.clone(), events.clone(), scratchpad.clone()),
                None,
            ),
        )
        .await?;
    store.replace_scratchpad(executed.scratchpad);

    let result = scope
        .run(Phase::Finalize, node.finalize(executed.output, store))
        .await?;
    Ok(NodeRun { result, events })
}

/// Emits the start/finish/failure call-outs around one phase.
struct PhaseScope<'a> {
    observer: &'a dyn Observer,
    instance_id: &'a str,
    state: &'a str,
}

impl PhaseScope<'_> {
    async fn run<T, F>(&self, phase: Phase, phase_future: F) -> Result<T, NodeError>
    where
        F: Future<Output = Result<T, NodeError>>,
    {
        self.observer.observe(&EngineEvent::PhaseStarted {
            instance_id: self.instance_id,
            state: self.state,
            phase,
        });
        let started = Instant::now();
        let result = phase_future.await;
        match &result {
            Ok(_) => self.observer.observe(&EngineEvent::PhaseFinished {
                instance_id: self.instance_id,
                state: self.state,
                phase,
                elapsed: started.elapsed(),
            }),
            Err(error) => self.observer.observe(&EngineEvent::PhaseFailed {
                instance_id: self.instance_id,
                state: self.state,
                phase,
                error: &error.to_string(),
            }),
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::BasicEvent;
    use crate::state_enum;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    state_enum! {
        pub(crate) enum Ticket {
            Open,
            Triage,
            Resolved,
            Broken,
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct Support;

    impl Domain for Support {
        type State = Ticket;
        type Context = Vec<String>;
        type Scratchpad = String;
        type Event = BasicEvent;
    }

    /// Consumes `note` events, stores them in the scratchpad, appends them
    /// to the context and moves to `next`. Fails the first `fail_times`
    /// executions.
    pub(crate) struct NoteTaker {
        pub(crate) next: Ticket,
        pub(crate) fail_times: u32,
        pub(crate) executions: Arc<AtomicU32>,
    }

    impl NoteTaker {
        pub(crate) fn to(next: Ticket) -> Self {
            Self {
                next,
                fail_times: 0,
                executions: Arc::new(AtomicU32::new(0)),
            }
        }

        pub(crate) fn failing(mut self, times: u32) -> Self {
            self.fail_times = times;
            self
        }
    }

    #[async_trait]
    impl Node<Support> for NoteTaker {
        type Args = ();
        type Output = Vec<String>;

        async fn prepare(
            &self,
            store: &SharedStore<Support>,
        ) -> Result<Prepared<Support, ()>, NodeError> {
            Ok(Prepared::new(()).with_events(store.get_by_type("note")))
        }

        async fn execute(
            &self,
            _args: (),
            events: Vec<BasicEvent>,
            _scratchpad: Option<String>,
        ) -> Result<Executed<Support, Vec<String>>, NodeError> {
            let attempt = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_times {
                return Err(NodeError::msg(format!("execution {attempt} failed")));
            }
            let notes: Vec<String> = events.into_iter().filter_map(|e| e.payload).collect();
            Ok(Executed::new(notes.clone(), Some(notes.join(","))))
        }

        async fn finalize(
            &self,
            notes: Vec<String>,
            store: &mut SharedStore<Support>,
        ) -> Result<StateResult<Support>, NodeError> {
            store.update_context(|ctx| ctx.iter().cloned().chain(notes).collect());
            Ok(StateResult::transition(self.next.clone()))
        }
    }
}
