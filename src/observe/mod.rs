//! Instrumentation call-outs.
//!
//! The engine reports what it is doing through an [`Observer`] instead of
//! talking to a tracing backend directly. [`TracingObserver`] (the default)
//! forwards every call-out to the `tracing` facade with structured fields;
//! callers that want metrics or spans implement `Observer` themselves.

use std::time::Duration;

/// Lifecycle phase of a node visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Execute,
    Finalize,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::Execute => write!(f, "execute"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// A named engine event with its attributes.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent<'a> {
    PhaseStarted {
        instance_id: &'a str,
        state: &'a str,
        phase: Phase,
    },
    PhaseFinished {
        instance_id: &'a str,
        state: &'a str,
        phase: Phase,
        elapsed: Duration,
    },
    PhaseFailed {
        instance_id: &'a str,
        state: &'a str,
        phase: Phase,
        error: &'a str,
    },
    RollbackEntered {
        instance_id: &'a str,
        depth: usize,
    },
    RollbackCommitted {
        instance_id: &'a str,
        depth: usize,
    },
    RollbackRestored {
        instance_id: &'a str,
        depth: usize,
        recovered_events: usize,
    },
    RetryScheduled {
        instance_id: &'a str,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &'a str,
    },
    EventsEnqueued {
        instance_id: &'a str,
        count: usize,
        buffered: bool,
    },
    Transitioned {
        instance_id: &'a str,
        from: &'a str,
        to: &'a str,
    },
    RoutedToErrorState {
        instance_id: &'a str,
        from: &'a str,
        error_state: &'a str,
        error: &'a str,
    },
}

impl EngineEvent<'_> {
    /// Stable name of the event, suitable as a metric or span name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhaseStarted { .. } => "node.phase.started",
            Self::PhaseFinished { .. } => "node.phase.finished",
            Self::PhaseFailed { .. } => "node.phase.failed",
            Self::RollbackEntered { .. } => "store.rollback.entered",
            Self::RollbackCommitted { .. } => "store.rollback.committed",
            Self::RollbackRestored { .. } => "store.rollback.restored",
            Self::RetryScheduled { .. } => "store.retry.scheduled",
            Self::EventsEnqueued { .. } => "store.events.enqueued",
            Self::Transitioned { .. } => "machine.transitioned",
            Self::RoutedToErrorState { .. } => "machine.error_state",
        }
    }
}

/// Receives engine call-outs.
pub trait Observer: Send + Sync {
    fn observe(&self, event: &EngineEvent<'_>);
}

/// Discards every call-out.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn observe(&self, _event: &EngineEvent<'_>) {}
}

/// Forwards call-outs to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, event: &EngineEvent<'_>) {
        let name = event.name();
        match *event {
            EngineEvent::PhaseStarted {
                instance_id,
                state,
                phase,
            } => tracing::trace!(event = name, instance_id, state, %phase),
            EngineEvent::PhaseFinished {
                instance_id,
                state,
                phase,
                elapsed,
            } => tracing::debug!(
                event = name,
                instance_id,
                state,
                %phase,
                elapsed_ms = elapsed.as_millis() as u64
            ),
            EngineEvent::PhaseFailed {
                instance_id,
                state,
                phase,
                error,
            } => tracing::warn!(event = name, instance_id, state, %phase, error),
            EngineEvent::RollbackEntered { instance_id, depth } => {
                tracing::trace!(event = name, instance_id, depth)
            }
            EngineEvent::RollbackCommitted { instance_id, depth } => {
                tracing::trace!(event = name, instance_id, depth)
            }
            EngineEvent::RollbackRestored {
                instance_id,
                depth,
                recovered_events,
            } => tracing::info!(event = name, instance_id, depth, recovered_events),
            EngineEvent::RetryScheduled {
                instance_id,
                attempt,
                max_attempts,
                delay,
                error,
            } => tracing::warn!(
                event = name,
                instance_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error
            ),
            EngineEvent::EventsEnqueued {
                instance_id,
                count,
                buffered,
            } => tracing::debug!(event = name, instance_id, count, buffered),
            EngineEvent::Transitioned {
                instance_id,
                from,
                to,
            } => tracing::info!(event = name, instance_id, from, to),
            EngineEvent::RoutedToErrorState {
                instance_id,
                from,
                error_state,
                error,
            } => tracing::error!(event = name, instance_id, from, error_state, error),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records call-out names for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        names: Mutex<Vec<&'static str>>,
    }

    impl RecordingObserver {
        pub(crate) fn names(&self) -> Vec<&'static str> {
            self.names.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, name: &str) -> usize {
            self.names().iter().filter(|n| **n == name).count()
        }
    }

    impl Observer for RecordingObserver {
        fn observe(&self, event: &EngineEvent<'_>) {
            self.names.lock().unwrap().push(event.name());
        }
    }
}
