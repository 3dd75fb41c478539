//! Controller-Side Components
//!
//! Implements the dispatch core that serializes engine calls onto one
//! worker process, the router for its replies, and the operation facade.

pub mod call;
pub mod channel;
pub mod dispatcher;
pub mod queue;
pub mod router;
pub mod session;

pub use call::{CallError, CallResult, Completion, CompletionPanic, PendingCall};
pub use channel::{ChannelState, ProcessChannel, TransportError, WorkerChannel, WorkerCommand, WorkerProcess};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use router::{LogHandler, Router, RouterError};
pub use session::{GameSettings, LootAsync, SessionOptions};
