//! Persistence seam for shared stores.

use super::error::PersistenceError;
use crate::checkpoint::Checkpoint;
use crate::core::Domain;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Durable storage for automaton instances, keyed by instance id.
///
/// The engine only requires that a `read` after a `write` yields an
/// equivalent checkpoint; the storage format is up to the implementation.
#[async_trait]
pub trait Persistence<D: Domain>: Send + Sync {
    /// Store the full state of an instance, replacing what was there.
    async fn write(&self, instance_id: &str, state: &Checkpoint<D>)
        -> Result<(), PersistenceError>;

    /// Append newly delivered events to the stored pending queue.
    async fn write_events(
        &self,
        instance_id: &str,
        events: &[D::Event],
    ) -> Result<(), PersistenceError>;

    /// Load the full state of an instance, if it was ever written.
    async fn read(&self, instance_id: &str) -> Result<Option<Checkpoint<D>>, PersistenceError>;
}

/// Non-durable persistence backed by a map.
///
/// Used by flow nodes for their nested automaton (whose state travels in
/// the parent's scratchpad) and by tests.
pub struct InMemoryPersistence<D: Domain> {
    states: Mutex<HashMap<String, Checkpoint<D>>>,
}

impl<D: Domain> InMemoryPersistence<D> {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Map a poisoned lock to `PersistenceError::Poisoned`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, PersistenceError> {
        m.lock()
            .map_err(|e| PersistenceError::Poisoned(format!("{:?}", e)))
    }

    /// Number of instances with a stored checkpoint.
    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Domain> Default for InMemoryPersistence<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Domain> Persistence<D> for InMemoryPersistence<D> {
    async fn write(
        &self,
        instance_id: &str,
        state: &Checkpoint<D>,
    ) -> Result<(), PersistenceError> {
        self.lock(&self.states)?
            .insert(instance_id.to_string(), state.clone());
        Ok(())
    }

    async fn write_events(
        &self,
        instance_id: &str,
        events: &[D::Event],
    ) -> Result<(), PersistenceError> {
        // Before the first full write there is nothing to append to; that
        // write carries the whole queue anyway.
        if let Some(state) = self.lock(&self.states)?.get_mut(instance_id) {
            state.pending.extend_from_slice(events);
        }
        Ok(())
    }

    async fn read(&self, instance_id: &str) -> Result<Option<Checkpoint<D>>, PersistenceError> {
        Ok(self.lock(&self.states)?.get(instance_id).cloned())
    }
}
