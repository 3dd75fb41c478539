//! Dispatcher
//!
//! Owns the call queue, the in-flight slot and the outbound channel behind a
//! single lock. Calls are admitted strictly one at a time in FIFO order:
//! a call is sent immediately only when the slot is idle, otherwise it waits
//! in the queue until the router reports the previous call's terminal
//! response.
//!
//! Completions never run while the lock is held, so a completion may issue
//! further calls on the same dispatcher.

use std::panic;
use std::sync::{Mutex, MutexGuard, PoisonError};

use loot_protocol::Request;
use tracing::{debug, error, warn};

use super::call::{fail_each, CallError, Completion, CompletionPanic, PendingCall};
use super::channel::{ChannelState, WorkerChannel};
use super::queue::{CallQueue, Slot};

/// Snapshot of the dispatcher for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Calls waiting behind the slot.
    pub queued: usize,
    /// Whether the slot is occupied (primed, on the wire or resolving).
    pub in_flight: bool,
    /// Whether the channel has failed for good.
    pub broken: bool,
}

struct Inner {
    queue: CallQueue,
    slot: Slot,
    channel: Box<dyn WorkerChannel>,
    state: ChannelState,
    next_id: u64,
}

/// Completions that must be failed once the lock is released.
struct Failed {
    completions: Vec<Completion>,
    error: CallError,
}

impl Inner {
    fn assign_id(&mut self, request: Request) -> Request {
        self.next_id += 1;
        request.with_id(self.next_id)
    }

    /// Send `call` and occupy the slot, or fail it and everything queued
    /// behind it if the channel is (or becomes) broken.
    fn dispatch(&mut self, call: PendingCall) -> Option<Failed> {
        let reason = match &self.state {
            ChannelState::Broken(reason) => reason.clone(),
            ChannelState::Healthy => match self.channel.send(&call.request) {
                Ok(()) => {
                    debug!(op = %call.request.op, id = ?call.request.id, "dispatched call");
                    self.slot = Slot::InFlight {
                        id: call.request.id,
                        completion: call.completion,
                    };
                    return None;
                }
                Err(e) => {
                    let reason = e.to_string();
                    error!(op = %call.request.op, error = %reason, "failed to send request to worker");
                    self.state = ChannelState::Broken(reason.clone());
                    reason
                }
            },
        };

        // Broken channel: nothing queued can ever be sent.
        self.slot = Slot::Idle;
        let mut completions = vec![call.completion];
        completions.extend(self.queue.drain().map(|c| c.completion));
        Some(Failed {
            completions,
            error: CallError::Transport(reason),
        })
    }
}

/// Serializes calls onto one worker channel.
pub struct Dispatcher {
    inner: Mutex<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher with an idle slot.
    pub fn new(channel: Box<dyn WorkerChannel>) -> Self {
        Self::with_slot(channel, None)
    }

    /// Create a dispatcher whose slot is pre-occupied by `init`.
    ///
    /// Nothing is sent until [`Dispatcher::start`] is called; calls enqueued
    /// before then wait behind `init`.
    pub fn primed(channel: Box<dyn WorkerChannel>, init: PendingCall) -> Self {
        Self::with_slot(channel, Some(init))
    }

    fn with_slot(channel: Box<dyn WorkerChannel>, init: Option<PendingCall>) -> Self {
        let mut inner = Inner {
            queue: CallQueue::new(),
            slot: Slot::Idle,
            channel,
            state: ChannelState::Healthy,
            next_id: 0,
        };
        if let Some(init) = init {
            let request = inner.assign_id(init.request);
            inner.slot = Slot::Primed(PendingCall {
                request,
                completion: init.completion,
            });
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a call. Never fails synchronously: the call is either sent,
    /// buffered, or (on a broken channel) resolved with a transport error
    /// on the calling thread.
    pub fn enqueue(&self, request: Request, completion: Completion) {
        let failed = {
            let mut inner = self.lock();
            let request = inner.assign_id(request);
            let call = PendingCall { request, completion };

            if !inner.slot.is_idle() {
                debug!(op = %call.request.op, queued = inner.queue.len() + 1, "slot busy, buffering call");
                inner.queue.push(call);
                return;
            }
            inner.dispatch(call)
        };
        raise(failed);
    }

    /// Send the primed initialization call. Returns false if the slot was
    /// not primed.
    pub fn start(&self) -> bool {
        let failed = {
            let mut inner = self.lock();
            match std::mem::replace(&mut inner.slot, Slot::Idle) {
                Slot::Primed(init) => inner.dispatch(init),
                other => {
                    inner.slot = other;
                    return false;
                }
            }
        };
        raise(failed);
        true
    }

    /// Take the completion of the call on the wire, leaving the slot
    /// occupied until [`Dispatcher::advance`].
    ///
    /// Returns `None` if no call is on the wire.
    pub fn take_in_flight(&self, response_id: Option<u64>) -> Option<Completion> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.slot, Slot::Resolving) {
            Slot::InFlight { id, completion } => {
                if let (Some(expected), Some(got)) = (id, response_id) {
                    if expected != got {
                        warn!(expected, got, "response id does not match the call in flight");
                    }
                }
                Some(completion)
            }
            other => {
                inner.slot = other;
                None
            }
        }
    }

    /// Free the slot after a completion ran and dispatch the next queued
    /// call, if any.
    pub fn advance(&self) -> Result<(), CompletionPanic> {
        let failed = {
            let mut inner = self.lock();
            if !matches!(inner.slot, Slot::Resolving) {
                warn!(slot = inner.slot.name(), "advance called without a resolving call");
                return Ok(());
            }
            inner.slot = Slot::Idle;
            match inner.queue.pop() {
                Some(next) => inner.dispatch(next),
                None => None,
            }
        };
        match failed.and_then(|f| fail_each(f.completions, &f.error)) {
            Some(payload) => Err(CompletionPanic::from_payload(payload)),
            None => Ok(()),
        }
    }

    /// Mark the channel broken and fail the call on the wire plus every
    /// queued call, in FIFO order.
    pub fn fail_all(&self, reason: &str) -> Result<(), CompletionPanic> {
        let failed = {
            let mut inner = self.lock();
            if !inner.state.is_broken() {
                inner.state = ChannelState::Broken(reason.to_string());
            }
            let reason = match &inner.state {
                ChannelState::Broken(reason) => reason.clone(),
                ChannelState::Healthy => reason.to_string(),
            };

            let mut completions = Vec::new();
            match std::mem::replace(&mut inner.slot, Slot::Idle) {
                Slot::Primed(call) => completions.push(call.completion),
                Slot::InFlight { completion, .. } => completions.push(completion),
                Slot::Resolving => inner.slot = Slot::Resolving,
                Slot::Idle => {}
            }
            completions.extend(inner.queue.drain().map(|c| c.completion));
            Failed {
                completions,
                error: CallError::Transport(reason),
            }
        };

        if !failed.completions.is_empty() {
            debug!(count = failed.completions.len(), "failing outstanding calls");
        }
        match fail_each(failed.completions, &failed.error) {
            Some(payload) => Err(CompletionPanic::from_payload(payload)),
            None => Ok(()),
        }
    }

    /// Close the outbound channel. Later calls resolve with a transport error.
    pub fn close_channel(&self) {
        let mut inner = self.lock();
        inner.channel.close();
        if !inner.state.is_broken() {
            inner.state = ChannelState::Broken("session closed".to_string());
        }
    }

    pub fn channel_state(&self) -> ChannelState {
        self.lock().state.clone()
    }

    pub fn stats(&self) -> DispatchStats {
        let inner = self.lock();
        DispatchStats {
            queued: inner.queue.len(),
            in_flight: !inner.slot.is_idle(),
            broken: inner.state.is_broken(),
        }
    }
}

/// Fail collected completions on the caller's thread, re-raising the first
/// panic once all of them ran.
fn raise(failed: Option<Failed>) {
    if let Some(payload) = failed.and_then(|f| fail_each(f.completions, &f.error)) {
        panic::resume_unwind(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChannel;
    use loot_protocol::Operation;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Completion) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |name: &str| -> Completion {
                let log = log.clone();
                let name = name.to_string();
                Box::new(move |result| {
                    let outcome = match result {
                        Ok(_) => "ok".to_string(),
                        Err(e) => format!("err({})", if e.is_transport() { "transport" } else { "engine" }),
                    };
                    log.lock().unwrap().push(format!("{}:{}", name, outcome));
                })
            }
        };
        (log, make)
    }

    #[test]
    fn test_first_call_dispatches_rest_buffer() {
        let channel = MockChannel::new();
        let dispatcher = Dispatcher::new(Box::new(channel.clone()));
        let (_, make) = recorder();

        dispatcher.enqueue(Request::new(Operation::GetLoadOrder, vec![]), make("a"));
        dispatcher.enqueue(Request::new(Operation::GetGroups, vec![]), make("b"));

        assert_eq!(channel.sent_ops(), vec![Operation::GetLoadOrder]);
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                queued: 1,
                in_flight: true,
                broken: false
            }
        );
    }

    #[test]
    fn test_ids_are_assigned_in_order() {
        let channel = MockChannel::new();
        let dispatcher = Dispatcher::new(Box::new(channel.clone()));
        let (_, make) = recorder();

        dispatcher.enqueue(Request::new(Operation::GetLoadOrder, vec![]), make("a"));
        let completion = dispatcher.take_in_flight(Some(1)).unwrap();
        completion(Ok(serde_json::Value::Null));
        dispatcher.enqueue(Request::new(Operation::GetGroups, vec![]), make("b"));
        dispatcher.advance().unwrap();

        let ids: Vec<Option<u64>> = channel.sent().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_primed_slot_holds_calls_until_start() {
        let channel = MockChannel::new();
        let (log, make) = recorder();
        let init = PendingCall {
            request: Request::new(Operation::Init, vec![]),
            completion: make("init"),
        };
        let dispatcher = Dispatcher::primed(Box::new(channel.clone()), init);

        dispatcher.enqueue(Request::new(Operation::GetLoadOrder, vec![]), make("a"));
        assert!(channel.sent().is_empty());
        assert_eq!(dispatcher.stats().queued, 1);

        assert!(dispatcher.start());
        assert!(!dispatcher.start());
        assert_eq!(channel.sent_ops(), vec![Operation::Init]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_failure_fails_queue_in_order() {
        let channel = MockChannel::new();
        let (log, make) = recorder();
        let init = PendingCall {
            request: Request::new(Operation::Init, vec![]),
            completion: make("init"),
        };
        let dispatcher = Dispatcher::primed(Box::new(channel.clone()), init);
        dispatcher.enqueue(Request::new(Operation::GetLoadOrder, vec![]), make("a"));
        dispatcher.enqueue(Request::new(Operation::GetGroups, vec![]), make("b"));

        channel.fail_sends("broken pipe");
        dispatcher.start();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["init:err(transport)", "a:err(transport)", "b:err(transport)"]
        );
        assert!(dispatcher.stats().broken);
        assert!(!dispatcher.stats().in_flight);
    }

    #[test]
    fn test_broken_channel_short_circuits() {
        let channel = MockChannel::new();
        let dispatcher = Dispatcher::new(Box::new(channel.clone()));
        let (log, make) = recorder();

        channel.fail_sends("worker gone");
        dispatcher.enqueue(Request::new(Operation::GetLoadOrder, vec![]), make("a"));
        channel.heal();
        dispatcher.enqueue(Request::new(Operation::GetGroups, vec![]), make("b"));

        assert!(channel.sent().is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["a:err(transport)", "b:err(transport)"]);
        assert!(matches!(dispatcher.channel_state(), ChannelState::Broken(r) if r.contains("worker gone")));
    }

    #[test]
    fn test_take_in_flight_without_call() {
        let dispatcher = Dispatcher::new(Box::new(MockChannel::new()));
        assert!(dispatcher.take_in_flight(None).is_none());
        assert!(!dispatcher.stats().in_flight);
    }

    #[test]
    fn test_close_channel_breaks_session() {
        let channel = MockChannel::new();
        let dispatcher = Dispatcher::new(Box::new(channel.clone()));
        let (log, make) = recorder();

        dispatcher.close_channel();
        dispatcher.enqueue(Request::new(Operation::GetLoadOrder, vec![]), make("a"));

        assert!(channel.is_closed());
        assert_eq!(*log.lock().unwrap(), vec!["a:err(transport)"]);
    }
}
