//! Response Router
//!
//! Demultiplexes inbound worker messages. Log notifications go straight to
//! the log handler and never touch the slot; terminal messages resolve the
//! call on the wire and then advance the queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use loot_protocol::{LogLevel, ProtocolError, WorkerMessage};
use tracing::warn;

use super::call::{invoke, panic_message, CallError, CallResult, CompletionPanic};
use super::dispatcher::Dispatcher;

/// Receives engine log notifications as `(level, message)`.
pub type LogHandler = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Faults reported to whoever feeds the router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A completion panicked. The queue was still advanced.
    #[error(transparent)]
    CompletionPanicked(#[from] CompletionPanic),

    #[error("terminal message received with no call in flight")]
    Unsolicited,

    #[error("log handler panicked: {0}")]
    LogHandlerPanicked(String),

    #[error("malformed worker message: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Routes worker messages to log handler and completions.
#[derive(Clone)]
pub struct Router {
    dispatcher: Arc<Dispatcher>,
    log_handler: LogHandler,
}

impl Router {
    pub fn new(dispatcher: Arc<Dispatcher>, log_handler: LogHandler) -> Self {
        Self {
            dispatcher,
            log_handler,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Decode and route one line of worker output.
    pub fn on_line(&self, line: &str) -> Result<(), RouterError> {
        let message = WorkerMessage::decode(line)?;
        self.on_message(message)
    }

    /// Route one decoded worker message.
    pub fn on_message(&self, message: WorkerMessage) -> Result<(), RouterError> {
        match message {
            WorkerMessage::Log { log } => {
                let handler = &self.log_handler;
                panic::catch_unwind(AssertUnwindSafe(|| handler(log.level, &log.message)))
                    .map_err(|payload| RouterError::LogHandlerPanicked(panic_message(payload.as_ref())))
            }
            WorkerMessage::Result { result, id } => self.complete(id, Ok(result)),
            WorkerMessage::Error { error, details, id } => self.complete(
                id,
                Err(CallError::Engine {
                    message: error,
                    details,
                }),
            ),
        }
    }

    fn complete(&self, id: Option<u64>, result: CallResult) -> Result<(), RouterError> {
        let Some(completion) = self.dispatcher.take_in_flight(id) else {
            warn!(?id, "dropping terminal message with no call in flight");
            return Err(RouterError::Unsolicited);
        };

        let outcome = invoke(completion, result);
        let advanced = self.dispatcher.advance();

        outcome.map_err(CompletionPanic::from_payload)?;
        advanced?;
        Ok(())
    }

    /// The worker's output ended; fail everything outstanding.
    pub fn on_disconnect(&self, reason: &str) -> Result<(), RouterError> {
        self.dispatcher.fail_all(reason)?;
        Ok(())
    }
}
