//! Mock Worker Channel
//!
//! In-process stand-in for the worker process, used to drive the dispatch
//! core without spawning anything. Tests feed worker messages to the
//! router directly and inspect what was sent through the mock.
//!
//! # Failure injection
//!
//! - `fail_sends`: every following send fails
//! - `fail_after`: the next N sends succeed, then sends fail
//! - `heal`: clear the injected failure

mod channel;
mod failure;

pub use channel::MockChannel;
pub use failure::SendFailure;
