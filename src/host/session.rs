//! Operation facade.
//!
//! `LootAsync` owns one worker process and exposes every engine operation as
//! a non-blocking call. Each proxy only packs its arguments into a request
//! and enqueues it; the dispatcher guarantees FIFO, one-at-a-time delivery.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use loot_protocol::{GameId, Group, Operation, Request};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use super::call::{CallError, CallResult, PendingCall};
use super::channel::{spawn_reader, WorkerChannel, WorkerCommand, WorkerProcess};
use super::dispatcher::{DispatchStats, Dispatcher};
use super::router::{LogHandler, Router};

/// Game the engine is initialized for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    pub game_id: GameId,
    pub game_path: String,
    pub local_path: String,
    pub language: String,
}

impl GameSettings {
    pub fn new(game_id: GameId, game_path: impl Into<String>) -> Self {
        Self {
            game_id,
            game_path: game_path.into(),
            local_path: String::new(),
            language: "en".to_string(),
        }
    }

    pub fn with_local_path(mut self, local_path: impl Into<String>) -> Self {
        self.local_path = local_path.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// The `init` request for these settings.
    pub fn init_request(&self) -> Request {
        Request::new(
            Operation::Init,
            vec![
                Value::from(self.game_id.as_str()),
                Value::from(self.game_path.as_str()),
                Value::from(self.local_path.as_str()),
                Value::from(self.language.as_str()),
            ],
        )
    }
}

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub worker: WorkerCommand,
    pub game: GameSettings,
    /// How long to wait for the worker to exit after its input is closed.
    pub shutdown_timeout: Duration,
}

/// Asynchronous handle to a LOOT engine running in a worker process.
pub struct LootAsync {
    dispatcher: Arc<Dispatcher>,
    process: Option<WorkerProcess>,
}

type SessionCell = Arc<Mutex<Option<LootAsync>>>;

/// Build the primed `init` call that hands the session to `callback` once
/// the worker acknowledged initialization.
fn init_call<F>(game: &GameSettings, cell: SessionCell, callback: F) -> PendingCall
where
    F: FnOnce(Result<LootAsync, CallError>) + Send + 'static,
{
    PendingCall::new(game.init_request(), move |result| {
        let session = cell.lock().unwrap_or_else(PoisonError::into_inner).take();
        match (result, session) {
            (Ok(_), Some(session)) => {
                info!("engine initialized");
                callback(Ok(session));
            }
            (Ok(_), None) => callback(Err(CallError::Transport(
                "session was released before initialization finished".to_string(),
            ))),
            // The session, if any, is dropped here, which stops the worker.
            (Err(e), _) => callback(Err(e)),
        }
    })
}

impl LootAsync {
    /// Spawn the worker and initialize the engine.
    ///
    /// `callback` receives the ready session once the worker acknowledged
    /// `init`, or the error that prevented it. Calls made on the session
    /// are always ordered after `init`.
    pub fn create<F>(options: SessionOptions, log_handler: LogHandler, callback: F)
    where
        F: FnOnce(Result<LootAsync, CallError>) + Send + 'static,
    {
        let (process, channel, stdout) = match WorkerProcess::spawn(&options.worker, options.shutdown_timeout) {
            Ok(spawned) => spawned,
            Err(e) => {
                callback(Err(CallError::Transport(e.to_string())));
                return;
            }
        };

        let cell: SessionCell = Arc::new(Mutex::new(None));
        let init = init_call(&options.game, cell.clone(), callback);
        let dispatcher = Arc::new(Dispatcher::primed(Box::new(channel), init));
        let router = Router::new(dispatcher.clone(), log_handler);

        *cell.lock().unwrap_or_else(PoisonError::into_inner) = Some(LootAsync {
            dispatcher: dispatcher.clone(),
            process: Some(process),
        });

        if let Err(e) = spawn_reader(stdout, router) {
            abandon(&dispatcher, &format!("failed to start reader thread: {}", e));
            return;
        }
        debug!(game = %options.game.game_id, "sending init");
        dispatcher.start();
    }

    /// Like [`LootAsync::create`], over an already connected channel.
    ///
    /// Returns the router so the caller can feed it the worker's output.
    pub fn create_with_channel<F>(
        channel: Box<dyn WorkerChannel>,
        game: &GameSettings,
        log_handler: LogHandler,
        callback: F,
    ) -> Router
    where
        F: FnOnce(Result<LootAsync, CallError>) + Send + 'static,
    {
        let cell: SessionCell = Arc::new(Mutex::new(None));
        let init = init_call(game, cell.clone(), callback);
        let dispatcher = Arc::new(Dispatcher::primed(channel, init));

        *cell.lock().unwrap_or_else(PoisonError::into_inner) = Some(LootAsync {
            dispatcher: dispatcher.clone(),
            process: None,
        });

        let router = Router::new(dispatcher.clone(), log_handler);
        dispatcher.start();
        router
    }

    /// Blocking form of [`LootAsync::create`].
    pub fn connect(options: SessionOptions, log_handler: LogHandler) -> Result<LootAsync, CallError> {
        let (tx, rx) = mpsc::channel();
        Self::create(options, log_handler, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().map_err(|_| {
            CallError::Transport("worker session ended before initialization finished".to_string())
        })?
    }

    /// Enqueue `op` with raw arguments; `completion` runs exactly once.
    pub fn call_with<F>(&self, op: Operation, args: Vec<Value>, completion: F)
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        self.dispatcher.enqueue(Request::new(op, args), Box::new(completion));
    }

    /// Enqueue `op` with raw arguments and receive its outcome on a channel.
    pub fn call(&self, op: Operation, args: Vec<Value>) -> Receiver<CallResult> {
        let (tx, rx) = mpsc::channel();
        self.call_with(op, args, move |result| {
            let _ = tx.send(result);
        });
        rx
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.process.as_ref().map(WorkerProcess::id)
    }
}

fn arg<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

macro_rules! proxy {
    ($($(#[$meta:meta])* $name:ident => $op:ident($($param:ident: $ty:ty),*);)*) => {
        impl LootAsync {
            $(
                $(#[$meta])*
                pub fn $name<F>(&self, $($param: $ty,)* callback: F)
                where
                    F: FnOnce(CallResult) + Send + 'static,
                {
                    self.call_with(Operation::$op, vec![$(arg($param)),*], callback);
                }
            )*
        }
    };
}

proxy! {
    /// Result: whether the masterlist changed.
    update_masterlist => UpdateMasterlist(masterlist_path: &str, remote_url: &str, remote_branch: &str);
    get_masterlist_revision => GetMasterlistRevision(masterlist_path: &str, get_short_id: bool);
    load_lists => LoadLists(masterlist_path: &str, userlist_path: Option<&str>);
    load_plugins => LoadPlugins(plugins: &[String], load_headers_only: bool);
    get_plugin => GetPlugin(plugin_name: &str);
    get_plugin_metadata => GetPluginMetadata(plugin_name: &str);
    /// Result: the plugins in sorted load order.
    sort_plugins => SortPlugins(plugins: &[String]);
    set_load_order => SetLoadOrder(plugins: &[String]);
    get_load_order => GetLoadOrder();
    load_current_load_order_state => LoadCurrentLoadOrderState();
    is_plugin_active => IsPluginActive(plugin_name: &str);
    get_groups => GetGroups(include_user_metadata: bool);
    get_user_groups => GetUserGroups();
    set_user_groups => SetUserGroups(groups: &[Group]);
    get_groups_path => GetGroupsPath(from_group: &str, to_group: &str);
    get_general_messages => GetGeneralMessages(evaluate_conditions: bool);
}

impl Drop for LootAsync {
    fn drop(&mut self) {
        // Closing stdin ends the worker loop; outstanding calls are failed by
        // the reader thread once the worker's output closes.
        self.dispatcher.close_channel();
        if let Some(mut process) = self.process.take() {
            process.shutdown();
        }
    }
}

/// Fail every outstanding call before the session could start.
fn abandon(dispatcher: &Dispatcher, reason: &str) {
    if let Err(fault) = dispatcher.fail_all(reason) {
        error!(error = %fault, "fault while abandoning session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChannel;
    use loot_protocol::{LogLevel, WorkerMessage};

    fn quiet() -> LogHandler {
        Arc::new(|_: LogLevel, _: &str| {})
    }

    #[test]
    fn test_init_request_shape() {
        let game = GameSettings::new(GameId::Fallout4, "/games/fo4").with_language("de");
        let request = game.init_request();
        assert_eq!(request.op, Operation::Init);
        assert_eq!(request.args, vec![Value::from("fallout4"), "/games/fo4".into(), "".into(), "de".into()]);
    }

    #[test]
    fn test_session_is_delivered_after_init() {
        let channel = MockChannel::new();
        let (tx, rx) = mpsc::channel();
        let game = GameSettings::new(GameId::SkyrimSe, "/games/skyrim");

        let router = LootAsync::create_with_channel(Box::new(channel.clone()), &game, quiet(), move |r| {
            tx.send(r).unwrap();
        });
        assert_eq!(channel.sent_ops(), vec![Operation::Init]);
        assert!(rx.try_recv().is_err());

        router.on_message(WorkerMessage::result(Value::Null).with_id(Some(1))).unwrap();
        let session = rx.try_recv().unwrap().unwrap();

        let outcome = session.call(Operation::GetLoadOrder, vec![]);
        router.on_message(WorkerMessage::result(serde_json::json!(["a.esp"]))).unwrap();
        assert_eq!(outcome.recv().unwrap().unwrap(), serde_json::json!(["a.esp"]));
    }

    #[test]
    fn test_proxy_packs_arguments() {
        let channel = MockChannel::new();
        let (tx, rx) = mpsc::channel();
        let game = GameSettings::new(GameId::Skyrim, "/g");
        let router = LootAsync::create_with_channel(Box::new(channel.clone()), &game, quiet(), move |r| {
            tx.send(r).unwrap();
        });
        router.on_message(WorkerMessage::result(Value::Null)).unwrap();
        let session = rx.recv().unwrap().unwrap();

        session.load_lists("/m.yaml", None, |_| {});
        assert_eq!(
            channel.last_sent().unwrap().args,
            vec![Value::from("/m.yaml"), Value::Null]
        );
    }

    #[test]
    fn test_failed_init_reports_error() {
        let channel = MockChannel::new();
        let (tx, rx) = mpsc::channel();
        let game = GameSettings::new(GameId::Skyrim, "/g");
        let router = LootAsync::create_with_channel(Box::new(channel.clone()), &game, quiet(), move |r| {
            tx.send(r.map(|_| ())).unwrap();
        });

        router
            .on_message(WorkerMessage::error("game not supported"))
            .unwrap();

        assert_eq!(rx.recv().unwrap(), Err(CallError::engine("game not supported")));
        assert!(channel.is_closed());
    }

    #[test]
    fn test_connect_to_missing_worker() {
        let options = SessionOptions {
            worker: WorkerCommand::new("/nonexistent/loot-worker"),
            game: GameSettings::new(GameId::Skyrim, "/g"),
            shutdown_timeout: Duration::from_millis(10),
        };
        match LootAsync::connect(options, quiet()) {
            Err(e) => assert!(e.is_transport()),
            Ok(_) => panic!("connected to a missing worker"),
        }
    }

    #[test]
    fn test_abandon_survives_panicking_completion() {
        let channel = MockChannel::new();
        let init = PendingCall::new(GameSettings::new(GameId::Skyrim, "/g").init_request(), |_| {
            panic!("init callback bug")
        });
        let dispatcher = Dispatcher::primed(Box::new(channel.clone()), init);
        let (tx, rx) = mpsc::channel();
        dispatcher.enqueue(
            Request::new(Operation::GetLoadOrder, vec![]),
            Box::new(move |r: CallResult| tx.send(r).unwrap()),
        );

        abandon(&dispatcher, "failed to start reader thread");

        assert!(rx.recv().unwrap().unwrap_err().is_transport());
        assert!(channel.sent().is_empty());
        assert!(dispatcher.stats().broken);
    }
}
