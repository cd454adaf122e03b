//! Ready-made nodes: routing without work, terminal states, error reporting.

use super::{Executed, Node, NodeError, Prepared};
use crate::checkpoint::{Checkpoint, FailureRecord};
use crate::core::{Domain, Guard, StateResult};
use crate::store::SharedStore;
use async_trait::async_trait;

/// Node that does no work and routes on the store alone.
///
/// Routes are checked in the order they were added; the first guard that
/// passes picks the target. Without a match the node returns its fallback,
/// which defaults to waiting for more events.
pub struct NoopNode<D: Domain> {
    routes: Vec<(Guard<SharedStore<D>>, D::State)>,
    fallback: StateResult<D>,
}

impl<D: Domain> NoopNode<D> {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            fallback: StateResult::waiting(),
        }
    }

    /// Transition to `to` when `guard` passes.
    pub fn route(mut self, guard: Guard<SharedStore<D>>, to: D::State) -> Self {
        self.routes.push((guard, to));
        self
    }

    /// Shorthand for [`route`](Self::route) with a closure.
    pub fn when<F>(self, predicate: F, to: D::State) -> Self
    where
        F: Fn(&SharedStore<D>) -> bool + Send + Sync + 'static,
    {
        self.route(Guard::new(predicate), to)
    }

    /// Result when no route matches.
    pub fn otherwise(mut self, fallback: StateResult<D>) -> Self {
        self.fallback = fallback;
        self
    }
}

impl<D: Domain> Default for NoopNode<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Domain> Node<D> for NoopNode<D> {
    type Args = ();
    type Output = ();

    async fn prepare(&self, _store: &SharedStore<D>) -> Result<Prepared<D, ()>, NodeError> {
        Ok(Prepared::new(()))
    }

    async fn execute(
        &self,
        _args: (),
        _events: Vec<D::Event>,
        scratchpad: Option<D::Scratchpad>,
    ) -> Result<Executed<D, ()>, NodeError> {
        Ok(Executed::new((), scratchpad))
    }

    async fn finalize(
        &self,
        _output: (),
        store: &mut SharedStore<D>,
    ) -> Result<StateResult<D>, NodeError> {
        let store: &SharedStore<D> = store;
        let target = self
            .routes
            .iter()
            .find(|(guard, _)| guard.check(store))
            .map(|(_, to)| StateResult::transition(to.clone()));
        Ok(target.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Node for terminal states.
pub struct FinalNode<D: Domain> {
    actions: Vec<D::Event>,
}

impl<D: Domain> FinalNode<D> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Emit these actions every time the state is reached.
    pub fn with_actions(actions: Vec<D::Event>) -> Self {
        Self { actions }
    }
}

impl<D: Domain> Default for FinalNode<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Domain> Node<D> for FinalNode<D> {
    type Args = ();
    type Output = ();

    async fn prepare(&self, _store: &SharedStore<D>) -> Result<Prepared<D, ()>, NodeError> {
        Ok(Prepared::new(()))
    }

    async fn execute(
        &self,
        _args: (),
        _events: Vec<D::Event>,
        scratchpad: Option<D::Scratchpad>,
    ) -> Result<Executed<D, ()>, NodeError> {
        Ok(Executed::new((), scratchpad))
    }

    async fn finalize(
        &self,
        _output: (),
        _store: &mut SharedStore<D>,
    ) -> Result<StateResult<D>, NodeError> {
        Ok(StateResult::terminal().with_actions(self.actions.clone()))
    }
}

/// Everything known about an instance when it reaches the error state.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic<D: Domain> {
    pub checkpoint: Checkpoint<D>,
    pub failure: Option<FailureRecord>,
}

pub type Reporter<D> = Box<dyn Fn(&Diagnostic<D>) + Send + Sync>;

/// Node for the error state: captures a [`Diagnostic`], hands it to an
/// optional reporter, and stops the automaton.
pub struct ErrorNode<D: Domain> {
    reporter: Option<Reporter<D>>,
}

impl<D: Domain> ErrorNode<D> {
    pub fn new() -> Self {
        Self { reporter: None }
    }

    pub fn reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&Diagnostic<D>) + Send + Sync + 'static,
    {
        self.reporter = Some(Box::new(reporter));
        self
    }
}

impl<D: Domain> Default for ErrorNode<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Domain> Node<D> for ErrorNode<D> {
    type Args = Diagnostic<D>;
    type Output = Diagnostic<D>;

    async fn prepare(
        &self,
        store: &SharedStore<D>,
    ) -> Result<Prepared<D, Diagnostic<D>>, NodeError> {
        Ok(Prepared::new(Diagnostic {
            checkpoint: store.checkpoint(),
            failure: store.last_failure().cloned(),
        }))
    }

    async fn execute(
        &self,
        diagnostic: Diagnostic<D>,
        _events: Vec<D::Event>,
        scratchpad: Option<D::Scratchpad>,
    ) -> Result<Executed<D, Diagnostic<D>>, NodeError> {
        Ok(Executed::new(diagnostic, scratchpad))
    }

    async fn finalize(
        &self,
        diagnostic: Diagnostic<D>,
        _store: &mut SharedStore<D>,
    ) -> Result<StateResult<D>, NodeError> {
        if let Some(failure) = &diagnostic.failure {
            tracing::error!(
                instance_id = %diagnostic.checkpoint.instance_id,
                state = %failure.state,
                error = %failure.message,
                "automaton stopped in error state"
            );
        }
        if let Some(report) = &self.reporter {
            report(&diagnostic);
        }
        Ok(StateResult::terminal())
    }
}
