//! Ordered queue of pending events.

use crate::core::Event;
use std::collections::{HashMap, VecDeque};

/// FIFO buffer of events awaiting processing.
///
/// Every selective removal keeps the relative order of the events it
/// leaves behind as well as of the events it returns.
#[derive(Clone, Debug, PartialEq)]
pub struct EventQueue<E> {
    events: VecDeque<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }
}

impl<E: Event> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_all(&mut self, events: impl IntoIterator<Item = E>) {
        self.events.extend(events);
    }

    /// Remove and return the oldest event.
    pub fn pop(&mut self) -> Option<E> {
        self.events.pop_front()
    }

    /// Remove and return every event, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        self.events.drain(..).collect()
    }

    /// Remove and return the events of one type.
    pub fn take_by_type(&mut self, event_type: &str) -> Vec<E> {
        let (taken, kept): (VecDeque<E>, VecDeque<E>) = self
            .events
            .drain(..)
            .partition(|event| event.event_type() == event_type);
        self.events = kept;
        taken.into_iter().collect()
    }

    /// Copies of the events of one type, leaving the queue untouched.
    pub fn filter_by_type(&self, event_type: &str) -> Vec<E> {
        self.events
            .iter()
            .filter(|event| event.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Remove the given events, matched by id. Each target removes at most
    /// one queued event, the oldest with that id. Returns how many were
    /// removed.
    pub fn remove(&mut self, targets: &[E]) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let mut wanted: HashMap<&str, usize> = HashMap::new();
        for target in targets {
            *wanted.entry(target.id()).or_default() += 1;
        }
        let before = self.events.len();
        self.events.retain(|event| match wanted.get_mut(event.id()) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        });
        before - self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E: Event> FromIterator<E> for EventQueue<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}
