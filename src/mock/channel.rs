//! Mock channel recording every request the dispatcher sends.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use loot_protocol::{Operation, Request};

use super::failure::SendFailure;
use crate::host::{TransportError, WorkerChannel};

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Request>,
    failure: Option<SendFailure>,
    closed: bool,
}

/// Cloneable handle; every clone shares the same recorded state, so a test
/// keeps one clone while the dispatcher owns another.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests sent so far, oldest first.
    pub fn sent(&self) -> Vec<Request> {
        self.state().sent.clone()
    }

    pub fn sent_ops(&self) -> Vec<Operation> {
        self.state().sent.iter().map(|r| r.op).collect()
    }

    pub fn last_sent(&self) -> Option<Request> {
        self.state().sent.last().cloned()
    }

    /// Make every following send fail with `reason`.
    pub fn fail_sends(&self, reason: impl Into<String>) {
        self.state().failure = Some(SendFailure::now(reason));
    }

    /// Let `count` more sends succeed, then fail with `reason`.
    pub fn fail_after(&self, count: usize, reason: impl Into<String>) {
        self.state().failure = Some(SendFailure::after(count, reason));
    }

    /// Clear any injected failure.
    pub fn heal(&self) {
        self.state().failure = None;
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl WorkerChannel for MockChannel {
    fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.closed {
            return Err(TransportError::Closed("mock channel closed".to_string()));
        }
        if let Some(reason) = state.failure.as_mut().and_then(|f| f.check().map(str::to_string)) {
            return Err(TransportError::Io(io::Error::new(io::ErrorKind::BrokenPipe, reason)));
        }
        state.sent.push(request.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.state().closed = true;
    }
}
