//! Pending calls and their resolution.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use loot_protocol::Request;
use serde_json::Value;

/// Error delivered to a call's completion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The worker could not be reached. Every call queued behind a
    /// transport failure receives the same error.
    #[error("LOOT closed? Please check your log. Error was: {0}")]
    Transport(String),

    /// The engine reported an error for this call only.
    #[error("{message}")]
    Engine {
        message: String,
        details: Option<Value>,
    },
}

impl CallError {
    pub fn engine(message: impl Into<String>) -> Self {
        CallError::Engine {
            message: message.into(),
            details: None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, CallError::Transport(_))
    }

    /// Process exit code used by the CLI for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            CallError::Transport(_) => 20,
            CallError::Engine { .. } => 40,
        }
    }
}

/// Outcome of one engine call.
pub type CallResult = Result<Value, CallError>;

/// Callback receiving a call's outcome. Invoked exactly once.
pub type Completion = Box<dyn FnOnce(CallResult) + Send>;

/// A request together with the completion waiting for its outcome.
pub struct PendingCall {
    pub request: Request,
    pub completion: Completion,
}

impl PendingCall {
    pub fn new<F>(request: Request, completion: F) -> Self
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        Self {
            request,
            completion: Box::new(completion),
        }
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// A completion panicked while handling its outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("completion handler panicked: {0}")]
pub struct CompletionPanic(pub String);

impl CompletionPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        CompletionPanic(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Invoke a completion, catching a panic raised inside it.
pub(crate) fn invoke(completion: Completion, result: CallResult) -> Result<(), Box<dyn Any + Send>> {
    panic::catch_unwind(AssertUnwindSafe(move || completion(result)))
}

/// Fail every completion in order. All of them run even if one panics; the
/// first panic payload is handed back.
pub(crate) fn fail_each(
    completions: Vec<Completion>,
    error: &CallError,
) -> Option<Box<dyn Any + Send>> {
    let mut first_panic = None;
    for completion in completions {
        if let Err(payload) = invoke(completion, Err(error.clone())) {
            first_panic.get_or_insert(payload);
        }
    }
    first_panic
}
