//! Rollback frames for guarded operations.
//!
//! Each guarded operation opens a frame holding a snapshot of the live
//! state and a buffer for events delivered while it runs. Frames form a
//! stack and are closed through the token handed out when they were opened,
//! so nested guarded operations never restore each other's snapshots.

use super::error::StoreError;
use super::queue::EventQueue;
use crate::core::Domain;

/// Handle to one open rollback frame.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a rollback frame must be committed or aborted"]
pub struct RollbackToken {
    id: u64,
    depth: usize,
}

impl RollbackToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Nesting depth of the frame, starting at 1.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Snapshot of live state taken when a frame opens.
#[derive(Debug)]
pub(crate) struct Snapshot<D: Domain> {
    pub(crate) context: D::Context,
    pub(crate) scratchpad: Option<D::Scratchpad>,
    pub(crate) pending: EventQueue<D::Event>,
}

#[derive(Debug)]
struct Frame<D: Domain> {
    id: u64,
    snapshot: Snapshot<D>,
    buffered: Vec<D::Event>,
}

/// Stack of open frames.
#[derive(Debug)]
pub(crate) struct RollbackStack<D: Domain> {
    frames: Vec<Frame<D>>,
    next_id: u64,
}

impl<D: Domain> Default for RollbackStack<D> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            next_id: 1,
        }
    }
}

/// What closing a frame yields back to the store.
pub(crate) enum Closed<D: Domain> {
    /// Buffered events to append to the live queue
    Release(Vec<D::Event>),
    /// Buffered events were handed to the enclosing frame
    Forwarded,
}

impl<D: Domain> RollbackStack<D> {
    pub(crate) fn open(&mut self, snapshot: Snapshot<D>) -> RollbackToken {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            snapshot,
            buffered: Vec::new(),
        });
        RollbackToken {
            id,
            depth: self.frames.len(),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Buffer events in the innermost frame. Hands the events back when no
    /// frame is open.
    pub(crate) fn buffer(&mut self, events: Vec<D::Event>) -> Option<Vec<D::Event>> {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.buffered.extend(events);
                None
            }
            None => Some(events),
        }
    }

    /// Close the innermost frame, keeping the live state.
    pub(crate) fn commit(&mut self, token: RollbackToken) -> Result<Closed<D>, StoreError> {
        let frame = self.pop(token)?;
        Ok(self.forward(frame.buffered))
    }

    /// Close the innermost frame, returning its snapshot for restoring.
    pub(crate) fn abort(
        &mut self,
        token: RollbackToken,
    ) -> Result<(Snapshot<D>, Closed<D>, usize), StoreError> {
        let frame = self.pop(token)?;
        let recovered = frame.buffered.len();
        Ok((frame.snapshot, self.forward(frame.buffered), recovered))
    }

    /// Pop frames down to and including the one `token` opened. Frames left
    /// open above it are discarded, their buffered events fold into it.
    fn pop(&mut self, token: RollbackToken) -> Result<Frame<D>, StoreError> {
        let expected = self
            .frames
            .last()
            .map(|frame| frame.id)
            .ok_or(StoreError::NoActiveRollback)?;
        let index = self
            .frames
            .iter()
            .position(|frame| frame.id == token.id)
            .ok_or(StoreError::RollbackMismatch {
                expected,
                found: token.id,
            })?;
        let stray = self.frames.split_off(index + 1);
        let mut frame = self.frames.pop().ok_or(StoreError::NoActiveRollback)?;
        for inner in stray {
            frame.buffered.extend(inner.buffered);
        }
        Ok(frame)
    }

    /// Events buffered in every open frame, outermost first.
    pub(crate) fn buffered(&self) -> impl Iterator<Item = &D::Event> {
        self.frames.iter().flat_map(|frame| frame.buffered.iter())
    }

    fn forward(&mut self, buffered: Vec<D::Event>) -> Closed<D> {
        match self.buffer(buffered) {
            Some(events) => Closed::Release(events),
            None => Closed::Forwarded,
        }
    }
}
