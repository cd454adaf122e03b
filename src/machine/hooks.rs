//! Caller hooks invoked by the driver.

use super::error::EngineError;
use crate::core::Domain;
use crate::store::SharedStore;
use std::sync::Arc;

/// Called with `(from, to, context)` on every committed transition.
pub type TransitionHook<D> = Arc<
    dyn Fn(&<D as Domain>::State, &<D as Domain>::State, &<D as Domain>::Context) + Send + Sync,
>;

/// Called before a failure is routed to the error state.
pub type ErrorHook<D> = Arc<dyn Fn(&EngineError, &SharedStore<D>) + Send + Sync>;

/// Optional driver callbacks.
pub struct Hooks<D: Domain> {
    on_transition: Option<TransitionHook<D>>,
    on_error: Option<ErrorHook<D>>,
}

impl<D: Domain> Default for Hooks<D> {
    fn default() -> Self {
        Self {
            on_transition: None,
            on_error: None,
        }
    }
}

impl<D: Domain> Clone for Hooks<D> {
    fn clone(&self) -> Self {
        Self {
            on_transition: self.on_transition.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<D: Domain> std::fmt::Debug for Hooks<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_transition", &self.on_transition.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<D: Domain> Hooks<D> {
    pub fn on_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(&D::State, &D::State, &D::Context) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EngineError, &SharedStore<D>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn transitioned(&self, from: &D::State, to: &D::State, context: &D::Context) {
        if let Some(hook) = &self.on_transition {
            hook(from, to, context);
        }
    }

    pub(crate) fn failed(&self, error: &EngineError, store: &SharedStore<D>) {
        if let Some(hook) = &self.on_error {
            hook(error, store);
        }
    }
}
