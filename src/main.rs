//! loot-async CLI
//!
//! Entry point for the `loot-async` command-line tool. Starts a worker,
//! initializes the engine for the configured game and runs operations
//! through the dispatch core.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::Receiver;

use clap::{Parser, Subcommand};
use loot_async::config::{SessionConfig, DEFAULT_LOG_FILTER, DEFAULT_WORKER_PROGRAM};
use loot_async::logging::{init_tracing, tracing_log_handler};
use loot_async::{CallError, CallResult, LootAsync, Operation, Overrides, Request};
use serde_json::{json, Value};
use tracing::debug;

const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "loot-async")]
#[command(about = "Run LOOT engine operations through a worker process", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Worker executable (overrides config and LOOT_WORKER)
    #[arg(long, global = true)]
    worker: Option<PathBuf>,

    /// Game identifier, e.g. skyrimse
    #[arg(long, global = true)]
    game: Option<String>,

    /// Game install directory
    #[arg(long, global = true)]
    game_path: Option<String>,

    /// Game local data directory
    #[arg(long, global = true)]
    local_path: Option<String>,

    /// Engine language code
    #[arg(long, global = true)]
    language: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one operation and print its result as JSON
    Call {
        /// Operation name, e.g. getLoadOrder
        op: String,

        /// Positional arguments, each a JSON value (bare words are strings)
        args: Vec<String>,
    },

    /// Run newline-delimited `{"type": ..., "args": [...]}` requests in order
    Batch {
        /// Request file (default: stdin)
        file: Option<PathBuf>,
    },

    /// List the available operations
    Ops,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Ops = cli.command {
        for op in Operation::user_facing() {
            println!("{}", op);
        }
        return ExitCode::SUCCESS;
    }

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(DEFAULT_LOG_FILTER);
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    init_tracing(&config.logging.filter);

    let calls = match &cli.command {
        Commands::Call { op, args } => parse_call(op, args).map(|request| vec![request]),
        Commands::Batch { file } => read_batch(file.as_deref()),
        Commands::Ops => Ok(Vec::new()),
    };
    let calls = match calls {
        Ok(calls) => calls,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let options = match config.session_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let session = match LootAsync::connect(options, tracing_log_handler()) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    debug!(pid = ?session.worker_pid(), calls = calls.len(), "engine ready");

    match cli.command {
        Commands::Call { .. } => run_call(&session, calls),
        _ => run_batch(&session, calls),
    }
}

fn resolve_config(cli: &Cli) -> Result<SessionConfig, loot_async::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    config.apply_env();
    config.apply_overrides(&Overrides {
        worker: cli.worker.clone(),
        game: cli.game.clone(),
        game_path: cli.game_path.clone(),
        local_path: cli.local_path.clone(),
        language: cli.language.clone(),
    })?;

    if config.worker.program == Path::new(DEFAULT_WORKER_PROGRAM) {
        if let Some(sibling) = sibling_worker() {
            config.worker.program = sibling;
        }
    }
    Ok(config)
}

/// `loot-worker` installed next to this executable, if any.
fn sibling_worker() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(DEFAULT_WORKER_PROGRAM)
        .with_extension(std::env::consts::EXE_EXTENSION);
    candidate.is_file().then_some(candidate)
}

fn parse_call(op: &str, args: &[String]) -> Result<Request, String> {
    let op: Operation = op.parse().map_err(|e| format!("{}", e))?;
    if op == Operation::Init {
        return Err("init is sent automatically; use --game and --game-path".to_string());
    }
    let args = args
        .iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect();
    Ok(Request::new(op, args))
}

fn read_batch(file: Option<&Path>) -> Result<Vec<Request>, String> {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut requests = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read batch: {}", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let request = Request::from_line(&line).map_err(|e| format!("line {}: {}", number + 1, e))?;
        if request.op == Operation::Init {
            return Err(format!("line {}: init is sent automatically", number + 1));
        }
        requests.push(request);
    }
    Ok(requests)
}

fn run_call(session: &LootAsync, calls: Vec<Request>) -> ExitCode {
    let Some(request) = calls.into_iter().next() else {
        return ExitCode::SUCCESS;
    };

    match wait(session.call(request.op, request.args)) {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Enqueue every request at once, then report outcomes in order as JSON
/// lines. The exit code is that of the first failure.
fn run_batch(session: &LootAsync, calls: Vec<Request>) -> ExitCode {
    let pending: Vec<(Operation, Receiver<CallResult>)> = calls
        .into_iter()
        .map(|request| (request.op, session.call(request.op, request.args)))
        .collect();

    let mut exit = None;
    for (op, outcome) in pending {
        let line = match wait(outcome) {
            Ok(result) => json!({ "op": op.as_str(), "result": result }),
            Err(e) => {
                exit.get_or_insert(e.exit_code());
                match &e {
                    CallError::Engine { details: Some(details), .. } => {
                        json!({ "op": op.as_str(), "error": e.to_string(), "details": details })
                    }
                    _ => json!({ "op": op.as_str(), "error": e.to_string() }),
                }
            }
        };
        println!("{}", line);
    }

    exit.map(ExitCode::from).unwrap_or(ExitCode::SUCCESS)
}

fn wait(outcome: Receiver<CallResult>) -> CallResult {
    outcome
        .recv()
        .unwrap_or_else(|_| Err(CallError::Transport("call dropped without a result".to_string())))
}
