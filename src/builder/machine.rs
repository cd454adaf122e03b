//! Builder for machine definitions.

use crate::builder::error::{BuildError, ConfigViolation};
use crate::core::{Domain, State};
use crate::machine::{EngineError, Hooks, MachineDefinition, StateMachine};
use crate::node::{Node, Runnable};
use crate::store::SharedStore;
use std::collections::HashMap;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<ConfigViolation>>;

/// Fluent builder for [`MachineDefinition`].
///
/// Missing required parts fail fast; everything else is validated together
/// so a single `build` reports every problem at once.
pub struct StateMachineBuilder<D: Domain> {
    initial: Option<D::State>,
    error_state: Option<D::State>,
    nodes: HashMap<D::State, Arc<dyn Runnable<D>>>,
    hooks: Hooks<D>,
    max_transitions: Option<usize>,
}

impl<D: Domain> StateMachineBuilder<D> {
    pub fn new() -> Self {
        Self {
            initial: None,
            error_state: None,
            nodes: HashMap::new(),
            hooks: Hooks::default(),
            max_transitions: None,
        }
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: D::State) -> Self {
        self.initial = Some(state);
        self
    }

    /// Set the state failures are routed to (required).
    pub fn error_state(mut self, state: D::State) -> Self {
        self.error_state = Some(state);
        self
    }

    /// Attach a node to a state, replacing any previous one.
    pub fn node<N: Node<D>>(self, state: D::State, node: N) -> Self {
        self.runnable(state, Arc::new(node))
    }

    /// Attach an already shared node.
    pub fn runnable(mut self, state: D::State, node: Arc<dyn Runnable<D>>) -> Self {
        self.nodes.insert(state, node);
        self
    }

    pub fn on_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(&D::State, &D::State, &D::Context) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_transition(hook);
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EngineError, &SharedStore<D>) + Send + Sync + 'static,
    {
        self.hooks = self.hooks.on_error(hook);
        self
    }

    /// Stop each `resume` call after `limit` transitions.
    pub fn max_transitions(mut self, limit: usize) -> Self {
        self.max_transitions = Some(limit);
        self
    }

    pub fn build(self) -> Result<MachineDefinition<D>, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;
        let error_state = self.error_state.ok_or(BuildError::MissingErrorState)?;
        if self.nodes.is_empty() {
            return Err(BuildError::NoNodes);
        }

        let checks: Vec<Check> = vec![
            has_node(&self.nodes, &initial, ConfigViolation::InitialWithoutNode),
            has_node(&self.nodes, &error_state, ConfigViolation::ErrorStateWithoutNode),
            if initial == error_state {
                Validation::fail(ConfigViolation::ErrorStateIsInitial(
                    initial.name().to_string(),
                ))
            } else {
                Validation::success(())
            },
            if self.max_transitions == Some(0) {
                Validation::fail(ConfigViolation::ZeroTransitionBudget)
            } else {
                Validation::success(())
            },
        ];

        match Validation::all_vec(checks).map(|_| ()) {
            Validation::Success(()) => Ok(MachineDefinition::new(
                initial,
                error_state,
                self.nodes,
                self.hooks,
                self.max_transitions,
            )),
            Validation::Failure(violations) => {
                Err(BuildError::Invalid(violations.iter().cloned().collect()))
            }
        }
    }

    /// Build the definition and pair it with a store.
    pub fn build_machine(self, store: SharedStore<D>) -> Result<StateMachine<D>, BuildError> {
        Ok(StateMachine::new(Arc::new(self.build()?), store))
    }
}

impl<D: Domain> Default for StateMachineBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

fn has_node<D: Domain>(
    nodes: &HashMap<D::State, Arc<dyn Runnable<D>>>,
    state: &D::State,
    violation: fn(String) -> ConfigViolation,
) -> Check {
    if nodes.contains_key(state) {
        Validation::success(())
    } else {
        Validation::fail(violation(state.name().to_string()))
    }
}
