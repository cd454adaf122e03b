//! State machine driver.
//!
//! A [`MachineDefinition`] is the immutable part of an automaton: the node
//! attached to every state, the initial and error states, and the hooks. It
//! is shared through `Arc` by any number of [`StateMachine`]s, each of which
//! pairs it with the [`SharedStore`] of one instance.
//!
//! [`StateMachine::resume`] delivers new events and runs nodes until the
//! automaton waits for more input or terminates. Node failures do not escape
//! `resume`: they are recorded and the automaton moves to the error state,
//! whose node runs next.

mod error;
mod hooks;

pub use error::EngineError;
pub use hooks::{ErrorHook, Hooks, TransitionHook};

use crate::core::{Domain, State, StateResult, Status};
use crate::node::{NodeRun, Runnable};
use crate::observe::EngineEvent;
use crate::store::SharedStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Nodes, states and hooks of an automaton.
pub struct MachineDefinition<D: Domain> {
    initial: D::State,
    error_state: D::State,
    nodes: HashMap<D::State, Arc<dyn Runnable<D>>>,
    hooks: Hooks<D>,
    max_transitions: Option<usize>,
}

impl<D: Domain> MachineDefinition<D> {
    pub(crate) fn new(
        initial: D::State,
        error_state: D::State,
        nodes: HashMap<D::State, Arc<dyn Runnable<D>>>,
        hooks: Hooks<D>,
        max_transitions: Option<usize>,
    ) -> Self {
        Self {
            initial,
            error_state,
            nodes,
            hooks,
            max_transitions,
        }
    }

    pub fn initial(&self) -> &D::State {
        &self.initial
    }

    pub fn error_state(&self) -> &D::State {
        &self.error_state
    }

    pub fn node(&self, state: &D::State) -> Option<&Arc<dyn Runnable<D>>> {
        self.nodes.get(state)
    }

    /// States with a registered node, in no particular order.
    pub fn states(&self) -> impl Iterator<Item = &D::State> {
        self.nodes.keys()
    }

    pub fn hooks(&self) -> &Hooks<D> {
        &self.hooks
    }

    /// Upper bound on transitions per `resume` call, if any.
    pub fn max_transitions(&self) -> Option<usize> {
        self.max_transitions
    }
}

impl<D: Domain> std::fmt::Debug for MachineDefinition<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("initial", &self.initial)
            .field("error_state", &self.error_state)
            .field("states", &self.nodes.keys().collect::<Vec<_>>())
            .field("max_transitions", &self.max_transitions)
            .finish()
    }
}

/// What one `resume` call ended with.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome<D: Domain> {
    /// `Waiting` or `Terminal`; `Transition` when the transition budget ran out
    pub status: Status,
    /// State the automaton is in
    pub state: D::State,
    /// Actions emitted during the call, in emission order
    pub actions: Vec<D::Event>,
    /// State changes made during the call
    pub transitions: usize,
}

/// One automaton instance: a shared definition plus its store.
pub struct StateMachine<D: Domain> {
    definition: Arc<MachineDefinition<D>>,
    store: SharedStore<D>,
    initialized: bool,
}

impl<D: Domain> StateMachine<D> {
    pub fn new(definition: Arc<MachineDefinition<D>>, store: SharedStore<D>) -> Self {
        Self {
            definition,
            store,
            initialized: false,
        }
    }

    pub fn definition(&self) -> &Arc<MachineDefinition<D>> {
        &self.definition
    }

    pub fn store(&self) -> &SharedStore<D> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SharedStore<D> {
        &mut self.store
    }

    pub fn into_store(self) -> SharedStore<D> {
        self.store
    }

    pub fn current_state(&self) -> Option<&D::State> {
        self.store.current_state()
    }

    /// Make sure the instance has a current state.
    ///
    /// A store that already has one is left alone. Otherwise the persisted
    /// state is loaded, and if there is none the instance starts in the
    /// initial state, which is persisted right away. Idempotent.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        if self.store.current_state().is_none() {
            self.store.load().await?;
        }
        if self.store.current_state().is_none() {
            self.store.set_current_state(self.definition.initial.clone());
            self.store.persist().await?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Deliver `events` and run nodes until the automaton waits or stops.
    pub async fn resume(&mut self, events: Vec<D::Event>) -> Result<Outcome<D>, EngineError> {
        self.initialize().await?;
        self.store.enqueue(events).await?;

        let mut actions = Vec::new();
        let mut transitions = 0;
        loop {
            let state = self
                .store
                .current_state()
                .cloned()
                .ok_or(EngineError::NotInitialized)?;

            if self
                .definition
                .max_transitions
                .is_some_and(|limit| transitions >= limit)
            {
                return Ok(Outcome {
                    status: Status::Transition,
                    state,
                    actions,
                    transitions,
                });
            }

            let NodeRun { result, events } = match self.run_node(&state).await {
                Ok(run) => run,
                Err(error) => {
                    self.route_to_error_state(&state, error).await?;
                    transitions += 1;
                    continue;
                }
            };

            match result {
                StateResult::Transition { to, actions: emitted } => {
                    actions.extend(emitted);
                    self.commit_transition(&state, to, &events).await?;
                    transitions += 1;
                }
                StateResult::Terminal { actions: emitted } => {
                    actions.extend(emitted);
                    self.store.persist().await?;
                    return Ok(Outcome {
                        status: Status::Terminal,
                        state,
                        actions,
                        transitions,
                    });
                }
                StateResult::Waiting { actions: emitted } => {
                    actions.extend(emitted);
                    self.store.persist().await?;
                    return Ok(Outcome {
                        status: Status::Waiting,
                        state,
                        actions,
                        transitions,
                    });
                }
            }
        }
    }

    async fn run_node(&mut self, state: &D::State) -> Result<NodeRun<D>, EngineError> {
        let node = self
            .definition
            .node(state)
            .cloned()
            .ok_or_else(|| EngineError::UnknownState(state.name().to_string()))?;
        node.run(state, &mut self.store)
            .await
            .map_err(|source| EngineError::NodeFailed {
                state: state.name().to_string(),
                source,
            })
    }

    async fn commit_transition(
        &mut self,
        from: &D::State,
        to: D::State,
        consumed: &[D::Event],
    ) -> Result<(), EngineError> {
        self.definition
            .hooks
            .transitioned(from, &to, self.store.context());
        self.store.observer().observe(&EngineEvent::Transitioned {
            instance_id: self.store.instance_id(),
            from: from.name(),
            to: to.name(),
        });

        self.store.log_transition(&to, consumed);
        if &to != from {
            self.store.clear_scratchpad();
        }
        self.store.set_current_state(to);
        self.store.persist().await?;
        Ok(())
    }

    async fn route_to_error_state(
        &mut self,
        from: &D::State,
        error: EngineError,
    ) -> Result<(), EngineError> {
        let error_state = self.definition.error_state.clone();
        if from == &error_state {
            return Err(EngineError::ErrorStateFailed {
                state: error_state.name().to_string(),
                source: Box::new(error),
            });
        }

        self.definition.hooks.failed(&error, &self.store);
        let message = error.to_string();
        self.store.observer().observe(&EngineEvent::RoutedToErrorState {
            instance_id: self.store.instance_id(),
            from: from.name(),
            error_state: error_state.name(),
            error: &message,
        });

        self.store.record_failure(from, message);
        self.store.log_transition(&error_state, &[]);
        self.store.clear_scratchpad();
        self.store.set_current_state(error_state);
        self.store.persist().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateMachineBuilder;
    use crate::core::BasicEvent;
    use crate::node::testing::{NoteTaker, Support, Ticket};
    use crate::node::{ErrorNode, FinalNode, NoopNode, Executed, Node, NodeError, Prepared};
    use crate::observe::testing::RecordingObserver;
    use crate::store::{InMemoryPersistence, Persistence, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn note(id: &str, text: &str) -> BasicEvent {
        BasicEvent::with_id(id, "note").payload(text)
    }

    fn builder() -> StateMachineBuilder<Support> {
        StateMachineBuilder::new()
            .initial(Ticket::Open)
            .error_state(Ticket::Broken)
            .node(Ticket::Broken, ErrorNode::<Support>::new())
    }

    fn machine(definition: MachineDefinition<Support>) -> StateMachine<Support> {
        let store = SharedStore::builder("ticket-1", vec![])
            .retry(RetryPolicy::never())
            .build();
        StateMachine::new(Arc::new(definition), store)
    }

    struct Exploding;

    #[async_trait]
    impl Node<Support> for Exploding {
        type Args = ();
        type Output = ();

        async fn prepare(
            &self,
            _store: &SharedStore<Support>,
        ) -> Result<Prepared<Support, ()>, NodeError> {
            Ok(Prepared::new(()))
        }

        async fn execute(
            &self,
            _args: (),
            _events: Vec<BasicEvent>,
            _scratchpad: Option<String>,
        ) -> Result<Executed<Support, ()>, NodeError> {
            Err(NodeError::msg("kaboom"))
        }

        async fn finalize(
            &self,
            _output: (),
            _store: &mut SharedStore<Support>,
        ) -> Result<StateResult<Support>, NodeError> {
            Ok(StateResult::terminal())
        }
    }

    #[tokio::test]
    async fn single_resume_reaches_final_state() {
        let definition = builder()
            .node(Ticket::Open, NoteTaker::to(Ticket::Resolved))
            .node(Ticket::Resolved, FinalNode::<Support>::new())
            .build()
            .unwrap();
        let mut machine = machine(definition);

        let outcome = machine.resume(vec![note("n1", "hello")]).await.unwrap();

        assert_eq!(outcome.status, Status::Terminal);
        assert_eq!(outcome.state, Ticket::Resolved);
        assert_eq!(outcome.transitions, 1);
        let history = machine.store().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].state, Ticket::Resolved);
        assert_eq!(history.entries()[0].events, vec![note("n1", "hello")]);
        assert_eq!(history.entries()[0].scratchpad.as_deref(), Some("hello"));
        assert!(machine.store().scratchpad().is_none());
        assert_eq!(machine.store().context(), &vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn resume_runs_several_transitions_per_call() {
        let definition = builder()
            .node(Ticket::Open, NoteTaker::to(Ticket::Triage))
            .node(Ticket::Triage, NoteTaker::to(Ticket::Resolved))
            .node(Ticket::Resolved, FinalNode::<Support>::new())
            .build()
            .unwrap();
        let mut machine = machine(definition);

        let outcome = machine.resume(vec![]).await.unwrap();

        assert_eq!(outcome.status, Status::Terminal);
        assert_eq!(outcome.transitions, 2);
        assert_eq!(
            machine.store().history().get_path(),
            vec![&Ticket::Triage, &Ticket::Resolved]
        );
    }

    #[tokio::test]
    async fn max_transitions_stops_early() {
        let definition = builder()
            .node(Ticket::Open, NoteTaker::to(Ticket::Triage))
            .node(Ticket::Triage, NoteTaker::to(Ticket::Resolved))
            .node(Ticket::Resolved, FinalNode::<Support>::new())
            .max_transitions(1)
            .build()
            .unwrap();
        let mut machine = machine(definition);

        let first = machine.resume(vec![]).await.unwrap();
        assert_eq!(first.status, Status::Transition);
        assert_eq!(first.state, Ticket::Triage);

        let second = machine.resume(vec![]).await.unwrap();
        assert_eq!(second.status, Status::Transition);
        assert_eq!(second.state, Ticket::Resolved);

        let third = machine.resume(vec![]).await.unwrap();
        assert_eq!(third.status, Status::Terminal);
        assert_eq!(third.transitions, 0);
    }

    #[tokio::test]
    async fn waiting_node_returns_and_resumes_later() {
        let definition = builder()
            .node(
                Ticket::Open,
                NoopNode::<Support>::new()
                    .when(|s| !s.get_by_type("note").is_empty(), Ticket::Triage),
            )
            .node(Ticket::Triage, NoteTaker::to(Ticket::Resolved))
            .node(Ticket::Resolved, FinalNode::<Support>::new())
            .build()
            .unwrap();
        let mut machine = machine(definition);

        let idle = machine.resume(vec![]).await.unwrap();
        assert_eq!(idle.status, Status::Waiting);
        assert_eq!(idle.state, Ticket::Open);

        let done = machine.resume(vec![note("n1", "go")]).await.unwrap();
        assert_eq!(done.status, Status::Terminal);
        assert_eq!(machine.store().context(), &vec!["go".to_string()]);
    }

    #[tokio::test]
    async fn failing_node_routes_to_error_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = Arc::new(RecordingObserver::default());
        let definition = builder()
            .node(Ticket::Open, Exploding)
            .on_error(move |error, _store| sink.lock().unwrap().push(error.to_string()))
            .build()
            .unwrap();
        let store = SharedStore::builder("ticket-1", vec![])
            .retry(RetryPolicy::never())
            .observer(observer.clone())
            .build();
        let mut machine = StateMachine::new(Arc::new(definition), store);

        let outcome = machine.resume(vec![]).await.unwrap();

        assert_eq!(outcome.status, Status::Terminal);
        assert_eq!(outcome.state, Ticket::Broken);
        let failure = machine.store().last_failure().unwrap();
        assert_eq!(failure.state, "Open");
        assert!(failure.message.contains("kaboom"));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(observer.count("machine.error_state"), 1);
    }

    #[tokio::test]
    async fn missing_node_routes_to_error_state() {
        let definition = builder()
            .node(Ticket::Open, NoteTaker::to(Ticket::Triage))
            .build()
            .unwrap();
        let mut machine = machine(definition);

        let outcome = machine.resume(vec![]).await.unwrap();

        assert_eq!(outcome.state, Ticket::Broken);
        let failure = machine.store().last_failure().unwrap();
        assert_eq!(failure.state, "Triage");
        assert!(failure.message.contains("no node registered"));
    }

    #[tokio::test]
    async fn failing_error_state_is_surfaced() {
        let definition = StateMachineBuilder::<Support>::new()
            .initial(Ticket::Open)
            .error_state(Ticket::Broken)
            .node(Ticket::Open, Exploding)
            .node(Ticket::Broken, Exploding)
            .build()
            .unwrap();
        let mut machine = machine(definition);

        let result = machine.resume(vec![]).await;

        assert!(matches!(result, Err(EngineError::ErrorStateFailed { .. })));
        assert_eq!(machine.current_state(), Some(&Ticket::Broken));
    }

    #[tokio::test]
    async fn transition_hook_sees_every_move() {
        let moves = Arc::new(Mutex::new(Vec::new()));
        let sink = moves.clone();
        let definition = builder()
            .node(Ticket::Open, NoteTaker::to(Ticket::Triage))
            .node(Ticket::Triage, NoteTaker::to(Ticket::Resolved))
            .node(Ticket::Resolved, FinalNode::<Support>::new())
            .on_transition(move |from, to, _ctx| {
                sink.lock()
                    .unwrap()
                    .push(format!("{}->{}", from.name(), to.name()))
            })
            .build()
            .unwrap();
        let mut machine = machine(definition);

        machine.resume(vec![]).await.unwrap();

        assert_eq!(
            *moves.lock().unwrap(),
            vec!["Open->Triage", "Triage->Resolved"]
        );
    }

    #[tokio::test]
    async fn self_transition_keeps_scratchpad() {
        let definition = builder()
            .node(Ticket::Open, NoteTaker::to(Ticket::Open))
            .max_transitions(1)
            .build()
            .unwrap();
        let mut machine = machine(definition);

        machine.resume(vec![note("n1", "again")]).await.unwrap();

        assert_eq!(machine.store().scratchpad().map(String::as_str), Some("again"));
    }

    #[tokio::test]
    async fn initialize_loads_persisted_instance() {
        let persistence = Arc::new(InMemoryPersistence::<Support>::new());
        let definition = Arc::new(
            builder()
                .node(
                    Ticket::Open,
                    NoopNode::<Support>::new()
                        .when(|s| !s.pending().is_empty(), Ticket::Triage),
                )
                .node(Ticket::Triage, NoopNode::<Support>::new())
                .build()
                .unwrap(),
        );

        let store = SharedStore::builder("ticket-9", vec![])
            .persistence(persistence.clone())
            .build();
        let mut first = StateMachine::new(definition.clone(), store);
        let outcome = first.resume(vec![note("n1", "x")]).await.unwrap();
        assert_eq!(outcome.state, Ticket::Triage);

        let store = SharedStore::builder("ticket-9", vec![])
            .persistence(persistence.clone())
            .build();
        let mut second = StateMachine::new(definition, store);
        second.initialize().await.unwrap();

        assert_eq!(second.current_state(), Some(&Ticket::Triage));
        assert_eq!(second.store().history().len(), 1);
        let stored = persistence.read("ticket-9").await.unwrap().unwrap();
        assert_eq!(stored.current_state, Some(Ticket::Triage));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let definition = builder()
            .node(Ticket::Open, NoopNode::<Support>::new())
            .build()
            .unwrap();
        let mut machine = machine(definition);

        machine.initialize().await.unwrap();
        machine.store_mut().set_current_state(Ticket::Triage);
        machine.initialize().await.unwrap();

        assert_eq!(machine.current_state(), Some(&Ticket::Triage));
    }
}
