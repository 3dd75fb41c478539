//! Call queue and the single in-flight slot.

use std::collections::VecDeque;

use super::call::{Completion, PendingCall};

/// FIFO of calls waiting for the slot.
#[derive(Debug, Default)]
pub struct CallQueue {
    calls: VecDeque<PendingCall>,
}

impl CallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: PendingCall) {
        self.calls.push_back(call);
    }

    pub fn pop(&mut self) -> Option<PendingCall> {
        self.calls.pop_front()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Remove every call, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = PendingCall> + '_ {
        self.calls.drain(..)
    }
}

/// Occupancy of the in-flight slot.
///
/// Only `Idle` admits a new dispatch; every other state buffers callers.
pub enum Slot {
    Idle,
    /// The initialization call, waiting for the explicit start trigger.
    Primed(PendingCall),
    /// A request is on the wire; `id` is the correlation id it was sent with.
    InFlight { id: Option<u64>, completion: Completion },
    /// The completion was taken out and is running outside the lock.
    Resolving,
}

impl Slot {
    pub fn is_idle(&self) -> bool {
        matches!(self, Slot::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Slot::Idle => "idle",
            Slot::Primed(_) => "primed",
            Slot::InFlight { .. } => "in-flight",
            Slot::Resolving => "resolving",
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::InFlight { id, .. } => f.debug_struct("InFlight").field("id", id).finish_non_exhaustive(),
            other => f.write_str(other.name()),
        }
    }
}
