//! Operation Facade Tests
//!
//! Tests for `LootAsync` over the mock channel:
//! - initialization is the first request and gates the session
//! - every proxy sends its operation with positional arguments
//! - primed dispatcher holds calls until started

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use loot_async::host::{Dispatcher, PendingCall};
use loot_async::mock::MockChannel;
use loot_async::{
    CallError, GameId, GameSettings, Group, LogHandler, LogLevel, LootAsync, Operation, Request, Router,
    WorkerMessage,
};
use serde_json::{json, Value};

fn quiet() -> LogHandler {
    Arc::new(|_: LogLevel, _: &str| {})
}

fn ready_session(channel: &MockChannel) -> (LootAsync, Router) {
    let (tx, rx) = mpsc::channel();
    let game = GameSettings::new(GameId::SkyrimSe, "/games/skyrimse").with_local_path("/local/skyrimse");
    let router = LootAsync::create_with_channel(Box::new(channel.clone()), &game, quiet(), move |result| {
        tx.send(result).unwrap();
    });
    router.on_message(WorkerMessage::result(Value::Null).with_id(Some(1))).unwrap();
    let session = rx.recv().unwrap().unwrap();
    (session, router)
}

// =============================================================================
// Initialization
// =============================================================================

mod init_tests {
    use super::*;

    #[test]
    fn test_init_is_first_request() {
        let channel = MockChannel::new();
        let (_session, _router) = ready_session(&channel);

        let init = &channel.sent()[0];
        assert_eq!(init.op, Operation::Init);
        assert_eq!(
            init.args,
            vec![json!("skyrimse"), json!("/games/skyrimse"), json!("/local/skyrimse"), json!("en")]
        );
        assert_eq!(init.id, Some(1));
    }

    #[test]
    fn test_calls_before_start_queue_behind_init() {
        let channel = MockChannel::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let init_order = order.clone();
        let init = PendingCall::new(
            GameSettings::new(GameId::Fallout4, "/games/fo4").init_request(),
            move |_| init_order.lock().unwrap().push("init"),
        );
        let dispatcher = Arc::new(Dispatcher::primed(Box::new(channel.clone()), init));
        let router = Router::new(dispatcher.clone(), quiet());

        let early_order = order.clone();
        dispatcher.enqueue(
            Request::new(Operation::GetLoadOrder, vec![]),
            Box::new(move |_| early_order.lock().unwrap().push("getLoadOrder")),
        );
        assert!(channel.sent().is_empty());
        assert!(dispatcher.stats().in_flight);

        dispatcher.start();
        assert_eq!(channel.sent_ops(), vec![Operation::Init]);

        router.on_message(WorkerMessage::result(Value::Null)).unwrap();
        assert_eq!(channel.sent_ops(), vec![Operation::Init, Operation::GetLoadOrder]);
        router.on_message(WorkerMessage::result(json!([]))).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["init", "getLoadOrder"]);
    }

    #[test]
    fn test_unsupported_game_fails_create() {
        let channel = MockChannel::new();
        let (tx, rx) = mpsc::channel();
        let game = GameSettings::new(GameId::Oblivion, "/games/oblivion");
        let router = LootAsync::create_with_channel(Box::new(channel.clone()), &game, quiet(), move |result| {
            tx.send(result.err()).unwrap();
        });

        router
            .on_message(WorkerMessage::error_with_details(
                "game not supported",
                json!({"gameId": "oblivion"}),
            ))
            .unwrap();

        match rx.recv().unwrap() {
            Some(CallError::Engine { message, .. }) => assert_eq!(message, "game not supported"),
            other => panic!("expected engine error, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_gone_during_init() {
        let channel = MockChannel::new();
        let (tx, rx) = mpsc::channel();
        let game = GameSettings::new(GameId::Skyrim, "/games/skyrim");
        let router = LootAsync::create_with_channel(Box::new(channel), &game, quiet(), move |result| {
            tx.send(result.err()).unwrap();
        });

        router.on_disconnect("worker closed its output").unwrap();

        assert!(matches!(rx.recv().unwrap(), Some(CallError::Transport(_))));
    }
}

// =============================================================================
// Operation Proxies
// =============================================================================

mod proxy_tests {
    use super::*;

    fn plugins() -> Vec<String> {
        vec!["Skyrim.esm".to_string(), "a.esp".to_string()]
    }

    #[test]
    fn test_every_proxy_sends_its_operation() {
        let channel = MockChannel::new();
        let (session, router) = ready_session(&channel);
        let done = Arc::new(Mutex::new(0));
        let count = || {
            let done = done.clone();
            move |_: loot_async::CallResult| *done.lock().unwrap() += 1
        };

        session.update_masterlist("/m.yaml", "https://example.invalid/masterlist.git", "master", count());
        session.get_masterlist_revision("/m.yaml", true, count());
        session.load_lists("/m.yaml", Some("/u.yaml"), count());
        session.load_plugins(&plugins(), true, count());
        session.get_plugin("a.esp", count());
        session.get_plugin_metadata("a.esp", count());
        session.sort_plugins(&plugins(), count());
        session.set_load_order(&plugins(), count());
        session.get_load_order(count());
        session.load_current_load_order_state(count());
        session.is_plugin_active("a.esp", count());
        session.get_groups(false, count());
        session.get_user_groups(count());
        session.set_user_groups(&[Group::new("late").after("default")], count());
        session.get_groups_path("default", "late", count());
        session.get_general_messages(true, count());

        for _ in 0..16 {
            router.on_message(WorkerMessage::result(Value::Null)).unwrap();
        }

        let sent = channel.sent_ops();
        assert_eq!(sent[0], Operation::Init);
        assert_eq!(sent[1..].to_vec(), Operation::user_facing().collect::<Vec<_>>());
        assert_eq!(*done.lock().unwrap(), 16);
    }

    #[test]
    fn test_proxy_argument_shapes() {
        let channel = MockChannel::new();
        let (session, router) = ready_session(&channel);

        session.set_user_groups(&[Group::new("late").after("default")], |_| {});
        assert_eq!(
            channel.last_sent().unwrap().args,
            vec![json!([{"name": "late", "after": ["default"]}])]
        );
        router.on_message(WorkerMessage::result(Value::Null)).unwrap();

        session.load_plugins(&plugins(), false, |_| {});
        assert_eq!(
            channel.last_sent().unwrap().args,
            vec![json!(["Skyrim.esm", "a.esp"]), json!(false)]
        );
    }

    #[test]
    fn test_generic_call_receives_result() {
        let channel = MockChannel::new();
        let (session, router) = ready_session(&channel);

        let outcome = session.call(Operation::IsPluginActive, vec![json!("a.esp")]);
        router.on_message(WorkerMessage::result(json!(true))).unwrap();

        assert_eq!(outcome.recv().unwrap(), Ok(json!(true)));
    }

    #[test]
    fn test_dropping_session_breaks_channel() {
        let channel = MockChannel::new();
        let (session, router) = ready_session(&channel);
        drop(session);

        assert!(channel.is_closed());
        assert!(router.dispatcher().stats().broken);
    }
}
