//! State transition history tracking.
//!
//! Provides immutable tracking of committed transitions over time,
//! following functional programming principles.

use super::domain::Domain;
use super::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single committed transition.
///
/// Each entry owns its copies of context, scratchpad and events, so nothing
/// done to live state afterwards can change it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct HistoryEntry<D: Domain> {
    /// The state the automaton moved into
    pub state: D::State,
    /// Context at the time of the transition
    pub context: D::Context,
    /// Scratchpad at the time of the transition
    pub scratchpad: Option<D::Scratchpad>,
    /// Events consumed by the step that produced the transition
    pub events: Vec<D::Event>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of committed transitions.
///
/// History is immutable - the `record` method returns a new history
/// with the entry added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct History<D: Domain> {
    entries: Vec<HistoryEntry<D>>,
}

impl<D: Domain> Default for History<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Domain> History<D> {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an entry, returning a new history.
    ///
    /// This is a pure function - it does not mutate the existing history
    /// but returns a new one with the entry added.
    pub fn record(&self, entry: HistoryEntry<D>) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    /// Append an entry in place.
    pub fn push(&mut self, entry: HistoryEntry<D>) {
        self.entries.push(entry);
    }

    /// Keep only the most recent `keep_last` entries, returning a new history.
    pub fn truncate(&self, keep_last: usize) -> Self {
        let skip = self.entries.len().saturating_sub(keep_last);
        Self {
            entries: self.entries[skip..].to_vec(),
        }
    }

    /// Get the path of states entered, oldest first.
    pub fn get_path(&self) -> Vec<&D::State> {
        self.entries.iter().map(|entry| &entry.state).collect()
    }

    /// Names of the states entered, oldest first.
    pub fn state_names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.state.name()).collect()
    }

    /// Calculate total duration from first to last entry.
    ///
    /// Returns `None` if there are no entries.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    /// Get all entries in order.
    pub fn entries(&self) -> &[HistoryEntry<D>] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry<D>> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
