//! Nodes that run a nested automaton.
//!
//! A flow node drives a complete automaton of its own, possibly with a
//! different vocabulary, as the work of a single parent state. The nested
//! automaton's full state travels in the parent's scratchpad between
//! visits, so a paused nested automaton resumes where it stopped instead of
//! starting over.

use super::{Executed, Node, NodeError, Prepared};
use crate::checkpoint::Checkpoint;
use crate::core::{Domain, State, StateResult, Status};
use crate::machine::{MachineDefinition, StateMachine};
use crate::observe::Observer;
use crate::store::{RetryPolicy, SharedStore};
use async_trait::async_trait;
use std::sync::Arc;

/// Parent scratchpad types that can carry a nested automaton's checkpoint.
///
/// Implemented for every `T` as the identity, so a parent whose scratchpad
/// type is `Checkpoint<N>` needs nothing extra. Parents that keep other data
/// in the scratchpad implement it for their own type.
pub trait NestedScratchpad<T>: Sized {
    fn embed(nested: T) -> Self;

    fn nested(&self) -> Option<T>;
}

impl<T: Clone> NestedScratchpad<T> for T {
    fn embed(nested: T) -> Self {
        nested
    }

    fn nested(&self) -> Option<T> {
        Some(self.clone())
    }
}

/// Arguments for one nested run.
#[derive(Clone)]
pub struct FlowArgs<N: Domain> {
    /// `"{parent instance}/{parent state}"`
    pub instance_id: String,
    /// Context a fresh nested automaton starts with
    pub context: N::Context,
    observer: Arc<dyn Observer>,
}

/// Outward result of one nested run.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowOutcome<D: Domain> {
    pub status: Status,
    pub actions: Vec<D::Event>,
}

type Seed<D, N> = Box<dyn Fn(&<D as Domain>::Context) -> <N as Domain>::Context + Send + Sync>;
type EventsIn<D, N> =
    Box<dyn Fn(Vec<<D as Domain>::Event>) -> Vec<<N as Domain>::Event> + Send + Sync>;
type ActionsOut<D, N> =
    Box<dyn Fn(Vec<<N as Domain>::Event>) -> Vec<<D as Domain>::Event> + Send + Sync>;

/// Node whose work is a nested automaton over domain `N`.
///
/// Each visit hands every pending parent event to the nested automaton and
/// resumes it. The node waits while the nested automaton waits (or sits in a
/// state marked inner-waiting) and completes when it terminates: with a
/// transition to `on_complete` if one is configured, otherwise as terminal.
pub struct FlowNode<D: Domain, N: Domain> {
    definition: Arc<MachineDefinition<N>>,
    seed: Seed<D, N>,
    events_in: EventsIn<D, N>,
    actions_out: ActionsOut<D, N>,
    on_complete: Option<D::State>,
    retry: RetryPolicy,
}

impl<D: Domain, N: Domain> FlowNode<D, N> {
    pub fn new<S, I, O>(
        definition: Arc<MachineDefinition<N>>,
        seed: S,
        events_in: I,
        actions_out: O,
    ) -> Self
    where
        S: Fn(&D::Context) -> N::Context + Send + Sync + 'static,
        I: Fn(Vec<D::Event>) -> Vec<N::Event> + Send + Sync + 'static,
        O: Fn(Vec<N::Event>) -> Vec<D::Event> + Send + Sync + 'static,
    {
        Self {
            definition,
            seed: Box::new(seed),
            events_in: Box::new(events_in),
            actions_out: Box::new(actions_out),
            on_complete: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Move the parent to `state` once the nested automaton terminates.
    pub fn on_complete(mut self, state: D::State) -> Self {
        self.on_complete = Some(state);
        self
    }

    /// Retry policy for the nested automaton's nodes.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

#[async_trait]
impl<D, N> Node<D> for FlowNode<D, N>
where
    D: Domain,
    N: Domain,
    D::Scratchpad: NestedScratchpad<Checkpoint<N>>,
{
    type Args = FlowArgs<N>;
    type Output = FlowOutcome<D>;

    async fn prepare(&self, store: &SharedStore<D>) -> Result<Prepared<D, FlowArgs<N>>, NodeError> {
        let state = store
            .current_state()
            .ok_or_else(|| NodeError::msg("flow node visited without a current state"))?;
        let args = FlowArgs {
            instance_id: format!("{}/{}", store.instance_id(), state.name()),
            context: (self.seed)(store.context()),
            observer: store.observer_handle(),
        };
        Ok(Prepared::new(args).with_events(store.pending().to_vec()))
    }

    async fn execute(
        &self,
        args: FlowArgs<N>,
        events: Vec<D::Event>,
        scratchpad: Option<D::Scratchpad>,
    ) -> Result<Executed<D, FlowOutcome<D>>, NodeError> {
        let mut store = SharedStore::<N>::builder(args.instance_id, args.context)
            .retry(self.retry.clone())
            .observer(args.observer)
            .build();
        let resumed = scratchpad
            .as_ref()
            .and_then(<D::Scratchpad as NestedScratchpad<Checkpoint<N>>>::nested);
        if let Some(checkpoint) = resumed {
            store.restore(checkpoint)?;
        }

        let mut machine = StateMachine::new(Arc::clone(&self.definition), store);
        let outcome = machine
            .resume((self.events_in)(events))
            .await
            .map_err(|e| NodeError::Nested(Box::new(e)))?;

        let inner_waiting = machine.current_state().is_some_and(State::is_inner_waiting);
        let status = match outcome.status {
            Status::Terminal if !inner_waiting => Status::Terminal,
            _ => Status::Waiting,
        };

        Ok(Executed::new(
            FlowOutcome {
                status,
                actions: (self.actions_out)(outcome.actions),
            },
            Some(<D::Scratchpad as NestedScratchpad<Checkpoint<N>>>::embed(
                machine.store().checkpoint(),
            )),
        ))
    }

    async fn finalize(
        &self,
        outcome: FlowOutcome<D>,
        store: &mut SharedStore<D>,
    ) -> Result<StateResult<D>, NodeError> {
        let result = match (outcome.status, &self.on_complete) {
            (Status::Terminal, Some(next)) => {
                store.clear_scratchpad();
                StateResult::transition(next.clone())
            }
            (Status::Terminal, None) => StateResult::terminal(),
            _ => StateResult::waiting(),
        };
        Ok(result.with_actions(outcome.actions))
    }
}
