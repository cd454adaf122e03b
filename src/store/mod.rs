//! Shared state store.
//!
//! One `SharedStore` exists per automaton instance. It owns the context,
//! the scratchpad, the pending event queue and the history, provides the
//! rollback and retry primitives node execution is built on, and is the
//! only component that talks to persistence.
//!
//! # Example
//!
//! ```rust
//! use waypoint::core::{BasicEvent, Domain};
//! use waypoint::state_enum;
//! use waypoint::store::SharedStore;
//!
//! state_enum! {
//!     pub enum Step { Start, Done }
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter;
//!
//! impl Domain for Counter {
//!     type State = Step;
//!     type Context = u32;
//!     type Scratchpad = String;
//!     type Event = BasicEvent;
//! }
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let mut store = SharedStore::<Counter>::builder("counter-1", 0).build();
//! store.enqueue(vec![BasicEvent::new("increment")]).await.unwrap();
//! store.update_context(|n| n + 1);
//!
//! assert_eq!(*store.context(), 1);
//! assert_eq!(store.pending().len(), 1);
//! # });
//! ```

mod error;
mod persistence;
mod queue;
mod retry;
mod rollback;

pub use error::{PersistenceError, StoreError};
pub use persistence::{InMemoryPersistence, Persistence};
pub use queue::EventQueue;
pub use retry::{DelayFn, RetryPolicy, RetrySettings};
pub use rollback::RollbackToken;

use crate::checkpoint::{
    Checkpoint, CheckpointError, FailureRecord, Format, MachineMetadata, CHECKPOINT_VERSION,
};
use crate::core::{Domain, History, HistoryEntry};
use crate::observe::{EngineEvent, Observer, TracingObserver};
use chrono::Utc;
use rollback::{Closed, RollbackStack, Snapshot};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boxed, sendable future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Live state of one automaton instance.
pub struct SharedStore<D: Domain> {
    instance_id: String,
    context: D::Context,
    scratchpad: Option<D::Scratchpad>,
    pending: EventQueue<D::Event>,
    history: History<D>,
    current_state: Option<D::State>,
    last_failure: Option<FailureRecord>,
    metadata: MachineMetadata,
    retries: AtomicU64,
    rollback: RollbackStack<D>,
    persistence: Arc<dyn Persistence<D>>,
    retry_policy: RetryPolicy,
    observer: Arc<dyn Observer>,
}

/// Builder for [`SharedStore`].
pub struct StoreBuilder<D: Domain> {
    instance_id: String,
    context: D::Context,
    persistence: Option<Arc<dyn Persistence<D>>>,
    retry_policy: RetryPolicy,
    observer: Arc<dyn Observer>,
}

impl<D: Domain> StoreBuilder<D> {
    /// Set the persistence collaborator. Defaults to [`InMemoryPersistence`].
    pub fn persistence(mut self, persistence: Arc<dyn Persistence<D>>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the retry policy used for prepare and execute.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the instrumentation observer. Defaults to [`TracingObserver`].
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> SharedStore<D> {
        SharedStore {
            instance_id: self.instance_id,
            context: self.context,
            scratchpad: None,
            pending: EventQueue::new(),
            history: History::new(),
            current_state: None,
            last_failure: None,
            metadata: MachineMetadata::default(),
            retries: AtomicU64::new(0),
            rollback: RollbackStack::default(),
            persistence: self
                .persistence
                .unwrap_or_else(|| Arc::new(InMemoryPersistence::new())),
            retry_policy: self.retry_policy,
            observer: self.observer,
        }
    }
}

#[derive(Serialize)]
#[serde(bound = "")]
struct Trace<'a, D: Domain> {
    instance_id: &'a str,
    current_state: Option<&'a D::State>,
    pending: Vec<D::Event>,
    history: &'a History<D>,
    last_failure: Option<&'a FailureRecord>,
}

impl<D: Domain> SharedStore<D> {
    pub fn builder(instance_id: impl Into<String>, context: D::Context) -> StoreBuilder<D> {
        StoreBuilder {
            instance_id: instance_id.into(),
            context,
            persistence: None,
            retry_policy: RetryPolicy::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Store with default collaborators holding the state of `checkpoint`.
    pub fn from_checkpoint(checkpoint: Checkpoint<D>) -> Result<Self, StoreError> {
        let mut store = Self::builder(checkpoint.instance_id.clone(), checkpoint.context.clone())
            .build();
        store.restore(checkpoint)?;
        Ok(store)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    pub(crate) fn observer_handle(&self) -> Arc<dyn Observer> {
        Arc::clone(&self.observer)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn metadata(&self) -> MachineMetadata {
        let mut metadata = self.metadata.clone();
        metadata.retries = self.retries.load(Ordering::Relaxed);
        metadata
    }

    // --- context -------------------------------------------------------

    pub fn context(&self) -> &D::Context {
        &self.context
    }

    pub fn set_context(&mut self, context: D::Context) {
        self.context = context;
    }

    /// Replace the context with the result of a pure updater.
    pub fn update_context<F>(&mut self, update: F)
    where
        F: FnOnce(&D::Context) -> D::Context,
    {
        self.context = update(&self.context);
    }

    // --- scratchpad ----------------------------------------------------

    pub fn scratchpad(&self) -> Option<&D::Scratchpad> {
        self.scratchpad.as_ref()
    }

    pub fn set_scratchpad(&mut self, scratchpad: D::Scratchpad) {
        self.scratchpad = Some(scratchpad);
    }

    pub fn replace_scratchpad(&mut self, scratchpad: Option<D::Scratchpad>) {
        self.scratchpad = scratchpad;
    }

    pub fn clear_scratchpad(&mut self) {
        self.scratchpad = None;
    }

    pub fn update_scratchpad<F>(&mut self, update: F)
    where
        F: FnOnce(Option<&D::Scratchpad>) -> Option<D::Scratchpad>,
    {
        self.scratchpad = update(self.scratchpad.as_ref());
    }

    // --- events --------------------------------------------------------

    /// Append events to the pending queue and persist the delta.
    ///
    /// While a rollback-guarded operation is in flight the events are held
    /// in its buffer and reach the live queue when the operation ends,
    /// whether it succeeds or is rolled back. If persisting the delta fails
    /// nothing is enqueued.
    pub async fn enqueue(&mut self, events: Vec<D::Event>) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        self.persist_events(&events).await?;

        let count = events.len();
        let buffered = self.rollback.is_active();
        if let Some(events) = self.rollback.buffer(events) {
            self.pending.push_all(events);
        }
        self.observer.observe(&EngineEvent::EventsEnqueued {
            instance_id: &self.instance_id,
            count,
            buffered,
        });
        Ok(())
    }

    pub fn pending(&self) -> &EventQueue<D::Event> {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return the oldest pending event.
    pub fn dequeue(&mut self) -> Option<D::Event> {
        self.pending.pop()
    }

    /// Remove and return all pending events.
    pub fn dequeue_all(&mut self) -> Vec<D::Event> {
        self.pending.drain()
    }

    /// Remove and return the pending events of one type.
    pub fn dequeue_by_type(&mut self, event_type: &str) -> Vec<D::Event> {
        self.pending.take_by_type(event_type)
    }

    /// Copies of the pending events of one type.
    pub fn get_by_type(&self, event_type: &str) -> Vec<D::Event> {
        self.pending.filter_by_type(event_type)
    }

    /// Remove specific events by id; returns how many were removed.
    pub fn remove(&mut self, events: &[D::Event]) -> usize {
        self.pending.remove(events)
    }

    // --- state & history -----------------------------------------------

    /// The explicit current state, or the last state recorded in history.
    pub fn current_state(&self) -> Option<&D::State> {
        self.current_state
            .as_ref()
            .or_else(|| self.history.last().map(|entry| &entry.state))
    }

    pub fn set_current_state(&mut self, state: D::State) {
        self.current_state = Some(state);
    }

    /// Append a history entry for a transition into `state`.
    pub fn log_transition(&mut self, state: &D::State, events: &[D::Event]) {
        let entry = HistoryEntry {
            state: state.clone(),
            context: self.context.clone(),
            scratchpad: self.scratchpad.clone(),
            events: events.to_vec(),
            timestamp: Utc::now(),
        };
        self.history.push(entry);
        self.metadata.transitions += 1;
    }

    pub fn history(&self) -> &History<D> {
        &self.history
    }

    /// Owned copy of the history, detached from live state.
    pub fn export_history(&self) -> History<D> {
        self.history.clone()
    }

    /// Keep only the most recent `keep_last` history entries.
    pub fn truncate_history(&mut self, keep_last: usize) {
        self.history = self.history.truncate(keep_last);
    }

    /// Pretty JSON trace of the instance, for diagnostics.
    pub fn export_trace(&self) -> Result<String, StoreError> {
        let trace = Trace::<D> {
            instance_id: &self.instance_id,
            current_state: self.current_state(),
            pending: self.pending.to_vec(),
            history: &self.history,
            last_failure: self.last_failure.as_ref(),
        };
        serde_json::to_string_pretty(&trace).map_err(|e| {
            StoreError::Checkpoint(CheckpointError::Encode {
                format: Format::Json,
                reason: e.to_string(),
            })
        })
    }

    pub fn record_failure(&mut self, state: &D::State, message: impl Into<String>) {
        self.last_failure = Some(FailureRecord {
            state: crate::core::State::name(state).to_string(),
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn last_failure(&self) -> Option<&FailureRecord> {
        self.last_failure.as_ref()
    }

    // --- rollback ------------------------------------------------------

    pub fn is_rolling_back(&self) -> bool {
        self.rollback.is_active()
    }

    pub fn rollback_depth(&self) -> usize {
        self.rollback.depth()
    }

    /// Snapshot context, scratchpad and queue, and open a rollback frame.
    pub fn begin_rollback(&mut self) -> RollbackToken {
        let token = self.rollback.open(Snapshot {
            context: self.context.clone(),
            scratchpad: self.scratchpad.clone(),
            pending: self.pending.clone(),
        });
        self.observer.observe(&EngineEvent::RollbackEntered {
            instance_id: &self.instance_id,
            depth: token.depth(),
        });
        token
    }

    /// Close a frame and keep the live state.
    ///
    /// Frames opened after `token` and still open are closed with it; their
    /// buffered events are kept.
    pub fn commit_rollback(&mut self, token: RollbackToken) -> Result<(), StoreError> {
        let depth = token.depth();
        let stray = self.rollback.depth().saturating_sub(depth);
        if let Closed::Release(events) = self.rollback.commit(token)? {
            self.pending.push_all(events);
        }
        self.warn_unwound(depth, stray);
        self.observer.observe(&EngineEvent::RollbackCommitted {
            instance_id: &self.instance_id,
            depth,
        });
        Ok(())
    }

    /// Close a frame, restore its snapshot, append the events delivered
    /// meanwhile, and persist the result.
    ///
    /// Frames opened after `token` and still open are discarded.
    pub async fn abort_rollback(&mut self, token: RollbackToken) -> Result<(), StoreError> {
        let depth = token.depth();
        let stray = self.rollback.depth().saturating_sub(depth);
        let (snapshot, closed, recovered_events) = self.rollback.abort(token)?;
        self.warn_unwound(depth, stray);
        self.context = snapshot.context;
        self.scratchpad = snapshot.scratchpad;
        self.pending = snapshot.pending;
        if let Closed::Release(events) = closed {
            self.pending.push_all(events);
        }
        self.metadata.rollbacks += 1;
        self.observer.observe(&EngineEvent::RollbackRestored {
            instance_id: &self.instance_id,
            depth,
            recovered_events,
        });
        self.persist().await
    }

    fn warn_unwound(&self, depth: usize, stray: usize) {
        if stray > 0 {
            tracing::warn!(
                instance_id = %self.instance_id,
                depth,
                unwound = stray,
                "rollback frames left open were closed with their parent"
            );
        }
    }

    /// Run `op` as an all-or-nothing unit.
    ///
    /// On success the mutations made by `op` stay. On failure the store is
    /// restored to its state before the call (events delivered meanwhile are
    /// appended to the restored queue) and the original error is returned.
    pub async fn with_rollback<T, Err, F>(&mut self, op: F) -> Result<T, Err>
    where
        F: for<'a> FnOnce(&'a mut SharedStore<D>) -> BoxFuture<'a, Result<T, Err>>,
        Err: Display,
    {
        let token = self.begin_rollback();
        match op(self).await {
            Ok(value) => {
                if let Err(e) = self.commit_rollback(token) {
                    tracing::error!(
                        instance_id = %self.instance_id,
                        error = %e,
                        "guarded operation left the rollback stack unbalanced"
                    );
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.abort_rollback(token).await {
                    tracing::error!(
                        instance_id = %self.instance_id,
                        error = %e,
                        original = %err,
                        "failed to persist restored state"
                    );
                }
                Err(err)
            }
        }
    }

    // --- retry ---------------------------------------------------------

    /// Invoke `op` until it succeeds or `max_attempts` (default: the store's
    /// policy) is reached. The last error is returned unchanged.
    pub async fn retry<T, Err, F, Fut>(&self, mut op: F, max_attempts: Option<u32>) -> Result<T, Err>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Err>>,
        Err: Display,
    {
        let max_attempts = max_attempts
            .unwrap_or(self.retry_policy.max_attempts)
            .max(1);
        let mut attempt = 1;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !self.retry_policy.should_retry(attempt, max_attempts) {
                return Err(err);
            }

            let delay = self.retry_policy.delay_for(attempt);
            let message = err.to_string();
            drop(err);
            self.retries.fetch_add(1, Ordering::Relaxed);
            self.observer.observe(&EngineEvent::RetryScheduled {
                instance_id: &self.instance_id,
                attempt,
                max_attempts,
                delay,
                error: &message,
            });
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    // --- persistence ---------------------------------------------------

    /// Full state of the instance.
    ///
    /// Events held back by open rollback frames count as pending.
    pub fn checkpoint(&self) -> Checkpoint<D> {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            instance_id: self.instance_id.clone(),
            timestamp: Utc::now(),
            current_state: self.current_state.clone(),
            context: self.context.clone(),
            scratchpad: self.scratchpad.clone(),
            pending: self
                .pending
                .iter()
                .chain(self.rollback.buffered())
                .cloned()
                .collect(),
            history: self.history.clone(),
            last_failure: self.last_failure.clone(),
            metadata: self.metadata(),
        }
    }

    /// Replace the entire live state with a checkpoint.
    pub fn restore(&mut self, checkpoint: Checkpoint<D>) -> Result<(), StoreError> {
        checkpoint.validate()?;
        self.current_state = checkpoint.current_state;
        self.context = checkpoint.context;
        self.scratchpad = checkpoint.scratchpad;
        self.pending = checkpoint.pending.into_iter().collect();
        self.history = checkpoint.history;
        self.last_failure = checkpoint.last_failure;
        self.retries
            .store(checkpoint.metadata.retries, Ordering::Relaxed);
        self.metadata = checkpoint.metadata;
        Ok(())
    }

    /// Write the full state through the persistence collaborator.
    pub async fn persist(&mut self) -> Result<(), StoreError> {
        self.metadata.updated_at = Utc::now();
        let checkpoint = self.checkpoint();
        self.persistence
            .write(&self.instance_id, &checkpoint)
            .await
            .map_err(|source| StoreError::Persistence {
                instance_id: self.instance_id.clone(),
                source,
            })
    }

    /// Write an event delta through the persistence collaborator.
    pub async fn persist_events(&self, events: &[D::Event]) -> Result<(), StoreError> {
        self.persistence
            .write_events(&self.instance_id, events)
            .await
            .map_err(|source| StoreError::Persistence {
                instance_id: self.instance_id.clone(),
                source,
            })
    }

    /// Replace the live state with the persisted one, if any.
    ///
    /// Returns `false` when nothing was ever persisted for this instance.
    pub async fn load(&mut self) -> Result<bool, StoreError> {
        let loaded = self
            .persistence
            .read(&self.instance_id)
            .await
            .map_err(|source| StoreError::Persistence {
                instance_id: self.instance_id.clone(),
                source,
            })?;
        match loaded {
            Some(checkpoint) => {
                self.restore(checkpoint)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
