//! Worker RPC Handler
//!
//! Implements the stdin/stdout loop of the worker process. The handler reads
//! one JSON request per line, runs it against the engine, and writes any
//! buffered log notifications followed by exactly one terminal message.
//! The loop ends when stdin reaches EOF, i.e. when the controller closes
//! its end of the channel.

use std::io::{self, BufRead, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use loot_protocol::{Operation, Request, WorkerMessage};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::dispatcher;
use crate::engine::{Engine, EngineError, EngineFactory, EngineResult, Logger};
use crate::memory::MemoryEngineFactory;

/// Main RPC handler for the worker.
pub struct RpcHandler {
    config: WorkerConfig,
    factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn Engine>>,
    logger: Logger,
}

impl RpcHandler {
    /// Create a new RPC handler that builds engines with `factory`.
    pub fn new(config: WorkerConfig, factory: Box<dyn EngineFactory>) -> Self {
        let logger = Logger::new(config.log_level);
        Self {
            config,
            factory,
            engine: None,
            logger,
        }
    }

    /// Create a handler hosting the in-memory reference engine.
    pub fn with_memory_engine(config: WorkerConfig) -> Self {
        Self::new(config, Box::new(MemoryEngineFactory))
    }

    /// Whether an `init` request has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Run the RPC loop on stdin/stdout.
    pub fn run(&mut self) -> io::Result<()> {
        self.run_with_io(&mut io::stdin().lock(), &mut io::stdout().lock())
    }

    /// Run the RPC loop with custom I/O (for testing).
    ///
    /// At most `max_request_bytes + 1` bytes of a line are buffered; the rest
    /// of an oversized line is skipped unread.
    pub fn run_with_io<R: BufRead, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> io::Result<()> {
        let limit = self.config.max_request_bytes;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader.by_ref().take(limit as u64 + 1).read_until(b'\n', &mut buf)?;
            if read == 0 {
                debug!("controller closed stdin, stopping");
                return Ok(());
            }

            let messages = if buf.last() != Some(&b'\n') && buf.len() > limit {
                let skipped = skip_line(reader)?;
                warn!(bytes = buf.len() + skipped, limit, "skipping oversized request");
                vec![oversized(limit)]
            } else {
                match std::str::from_utf8(&buf) {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => self.handle_line(line.trim()),
                    Err(e) => vec![EngineError::InvalidRequest(format!("invalid UTF-8: {}", e)).to_message()],
                }
            };
            for message in messages {
                self.write_message(writer, &message)?;
            }
        }
    }

    /// Handle one request line, returning the messages to emit in order.
    pub fn handle_line(&mut self, line: &str) -> Vec<WorkerMessage> {
        if line.len() > self.config.max_request_bytes {
            return vec![oversized(self.config.max_request_bytes)];
        }

        let (id, outcome) = match decode_request(line) {
            Ok(request) => (request.id, self.handle(&request)),
            Err((id, err)) => {
                warn!(error = %err, "rejecting request");
                (id, Err(err))
            }
        };

        let mut messages: Vec<WorkerMessage> = self
            .logger
            .drain()
            .into_iter()
            .map(|log| WorkerMessage::Log { log })
            .collect();
        let terminal = match outcome {
            Ok(result) => WorkerMessage::result(result),
            Err(err) => err.to_message(),
        };
        messages.push(terminal.with_id(id));
        messages
    }

    fn handle(&mut self, request: &Request) -> EngineResult<Value> {
        debug!(op = %request.op, id = ?request.id, "handling request");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_operation(request)));
        outcome.unwrap_or_else(|_| Err(EngineError::Other("unknown exception".to_string())))
    }

    fn run_operation(&mut self, request: &Request) -> EngineResult<Value> {
        if request.op == Operation::Init {
            let params = dispatcher::parse_init(request)?;
            let engine = self.factory.create(&params, self.logger.clone())?;
            info!(game = %params.game_id, "engine initialized");
            self.engine = Some(engine);
            return Ok(Value::Null);
        }

        let engine = self.engine.as_deref_mut().ok_or(EngineError::NotInitialized)?;
        dispatcher::dispatch(engine, request)
    }

    /// Write one message as a line and flush.
    fn write_message<W: Write>(&self, writer: &mut W, message: &WorkerMessage) -> io::Result<()> {
        let json = message
            .to_line()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

fn oversized(limit: usize) -> WorkerMessage {
    EngineError::InvalidRequest(format!("request exceeds maximum size of {} bytes", limit)).to_message()
}

/// Discard input up to and including the next newline, returning how many
/// bytes were dropped.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return Ok(skipped);
        }
        let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (chunk.len(), false),
        };
        reader.consume(used);
        skipped += used;
        if done {
            return Ok(skipped);
        }
    }
}

/// Decode a request line, keeping the correlation id when the op is bad.
fn decode_request(line: &str) -> Result<Request, (Option<u64>, EngineError)> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| (None, EngineError::InvalidRequest(format!("invalid JSON: {}", e))))?;
    let id = value.get("id").and_then(Value::as_u64);

    match value.get("type").and_then(Value::as_str) {
        Some(op) if op.parse::<Operation>().is_err() => {
            return Err((id, EngineError::UnknownOperation(op.to_string())));
        }
        Some(_) => {}
        None => {
            return Err((id, EngineError::InvalidRequest("missing `type` field".to_string())));
        }
    }

    serde_json::from_value(value).map_err(|e| (id, EngineError::InvalidRequest(e.to_string())))
}
