//! Property-based tests for the store and core types.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::Utc;
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use waypoint::core::{BasicEvent, Domain, Guard, History, HistoryEntry, State};
use waypoint::state_enum;
use waypoint::store::{RetryPolicy, SharedStore};

state_enum! {
    enum Phase {
        Intake,
        Working,
        Complete,
        Failed,
    }
    waiting: [Working]
}

#[derive(Clone, Debug, PartialEq)]
struct Pipeline;

impl Domain for Pipeline {
    type State = Phase;
    type Context = Vec<u8>;
    type Scratchpad = String;
    type Event = BasicEvent;
}

const EVENT_TYPES: [&str; 3] = ["create", "update", "delete"];

prop_compose! {
    fn arbitrary_state()(variant in 0..4u8) -> Phase {
        match variant {
            0 => Phase::Intake,
            1 => Phase::Working,
            2 => Phase::Complete,
            _ => Phase::Failed,
        }
    }
}

prop_compose! {
    fn arbitrary_batches()(batches in prop::collection::vec(
        prop::collection::vec(0..EVENT_TYPES.len(), 0..5),
        0..6,
    )) -> Vec<Vec<BasicEvent>> {
        let mut next_id = 0;
        batches
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .map(|kind| {
                        next_id += 1;
                        BasicEvent::with_id(format!("e{next_id}"), EVENT_TYPES[kind])
                    })
                    .collect()
            })
            .collect()
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn store() -> SharedStore<Pipeline> {
    SharedStore::builder("pipeline-1", vec![])
        .retry(RetryPolicy::immediate(1))
        .build()
}

fn ids(events: &[BasicEvent]) -> Vec<String> {
    events.iter().map(|e| e.id.clone()).collect()
}

proptest! {
    #[test]
    fn guard_is_deterministic(state in arbitrary_state()) {
        let guard = Guard::new(|s: &Phase| !s.is_inner_waiting());
        let result1 = guard.check(&state);
        let result2 = guard.check(&state);
        prop_assert_eq!(result1, result2);
    }

    #[test]
    fn state_name_is_stable(state in arbitrary_state()) {
        let name1 = state.name();
        let name2 = state.name();
        prop_assert_eq!(name1, name2);
    }

    #[test]
    fn enqueue_preserves_fifo_order(batches in arbitrary_batches()) {
        let expected: Vec<String> = batches.iter().flat_map(|b| ids(b)).collect();

        let drained = block_on(async {
            let mut store = store();
            for batch in batches {
                store.enqueue(batch).await.unwrap();
            }
            store.dequeue_all()
        });

        prop_assert_eq!(ids(&drained), expected);
    }

    #[test]
    fn dequeue_by_type_partitions_queue(
        batches in arbitrary_batches(),
        kind in 0..EVENT_TYPES.len(),
    ) {
        let all: Vec<BasicEvent> = batches.iter().flatten().cloned().collect();
        let event_type = EVENT_TYPES[kind];

        let (taken, remaining) = block_on(async {
            let mut store = store();
            store.enqueue(all.clone()).await.unwrap();
            let taken = store.dequeue_by_type(event_type);
            (taken, store.dequeue_all())
        });

        let expected_taken: Vec<BasicEvent> =
            all.iter().filter(|e| e.event_type == event_type).cloned().collect();
        let expected_remaining: Vec<BasicEvent> =
            all.iter().filter(|e| e.event_type != event_type).cloned().collect();
        prop_assert_eq!(taken, expected_taken);
        prop_assert_eq!(remaining, expected_remaining);
    }

    #[test]
    fn rollback_restores_and_appends_late_events(
        before in arbitrary_batches(),
        late in arbitrary_batches(),
        mutated in prop::collection::vec(any::<u8>(), 0..8),
    ) {
        let before: Vec<BasicEvent> = before.into_iter().flatten().collect();
        let late: Vec<BasicEvent> = late
            .into_iter()
            .flatten()
            .map(|e| BasicEvent::with_id(format!("late-{}", e.id), e.event_type))
            .collect();
        let expected: Vec<String> = ids(&before).into_iter().chain(ids(&late)).collect();

        let (context, pending) = block_on(async {
            let mut store = store();
            store.set_context(vec![7]);
            store.enqueue(before).await.unwrap();

            let result: Result<(), String> = store
                .with_rollback(move |s| {
                    Box::pin(async move {
                        s.set_context(mutated);
                        s.dequeue_all();
                        s.enqueue(late).await.map_err(|e| e.to_string())?;
                        Err("abort".to_string())
                    })
                })
                .await;
            assert!(result.is_err());
            (store.context().clone(), store.dequeue_all())
        });

        prop_assert_eq!(context, vec![7]);
        prop_assert_eq!(ids(&pending), expected);
    }

    #[test]
    fn retry_invokes_exactly_as_often_as_needed(
        failures in 0u32..8,
        max_attempts in 1u32..6,
    ) {
        let calls = AtomicU32::new(0);

        let result = block_on(async {
            store()
                .retry(
                    |attempt| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if attempt <= failures {
                                Err(format!("failure {attempt}"))
                            } else {
                                Ok(attempt)
                            }
                        }
                    },
                    Some(max_attempts),
                )
                .await
        });

        let expected_calls = (failures + 1).min(max_attempts);
        prop_assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
        if failures < max_attempts {
            prop_assert_eq!(result, Ok(failures + 1));
        } else {
            prop_assert_eq!(result, Err(format!("failure {max_attempts}")));
        }
    }

    #[test]
    fn history_record_leaves_original_untouched(
        states in prop::collection::vec(arbitrary_state(), 1..10),
    ) {
        let mut history: History<Pipeline> = History::new();
        let mut snapshots = Vec::new();

        for state in &states {
            snapshots.push(history.clone());
            history = history.record(HistoryEntry {
                state: state.clone(),
                context: vec![],
                scratchpad: None,
                events: vec![],
                timestamp: Utc::now(),
            });
        }

        prop_assert_eq!(history.len(), states.len());
        for (index, snapshot) in snapshots.iter().enumerate() {
            prop_assert_eq!(snapshot.len(), index);
        }
        let path: Vec<Phase> = history.get_path().into_iter().cloned().collect();
        prop_assert_eq!(path, states);
    }

    #[test]
    fn exponential_backoff_never_exceeds_cap(attempt in 1u32..64, base_ms in 1u64..500) {
        let cap = std::time::Duration::from_millis(2_000);
        let policy = RetryPolicy::exponential(
            10,
            std::time::Duration::from_millis(base_ms),
            cap,
        );
        prop_assert!(policy.delay_for(attempt) <= cap);
    }
}
