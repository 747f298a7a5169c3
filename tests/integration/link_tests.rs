//! Connection agent against the scripted mock server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use pinagent::app::commands::ControlCommand;
use pinagent::app::events::OutboundEvent;
use pinagent::app::ports::EventSink;
use pinagent::link::{ConnectionAgent, ConnectionState, OutboundQueue};

use crate::mocks::{MockServer, RecordingHandler, wait_until};
use crate::rig;

struct Link {
    server: MockServer,
    handler: Arc<RecordingHandler>,
    queue: Arc<OutboundQueue>,
    agent: pinagent::link::AgentHandle,
    thread: std::thread::JoinHandle<()>,
}

fn start(refused: usize) -> Link {
    let server = MockServer::new();
    let handler = Arc::new(RecordingHandler::default());
    let queue = Arc::new(OutboundQueue::new());
    let agent = ConnectionAgent::new(
        &rig::config(),
        server.connector(refused),
        handler.clone(),
        queue.clone(),
    );
    let handle = agent.handle();
    let thread = agent.spawn().unwrap();
    Link {
        server,
        handler,
        queue,
        agent: handle,
        thread,
    }
}

fn active(link: &Link) -> bool {
    wait_until(Duration::from_secs(5), || link.agent.state() == ConnectionState::Active)
}

#[test]
fn register_is_first_message_with_identity() {
    let link = start(0);
    assert!(active(&link));
    let sent = link.server.sent();
    assert_eq!(sent[0]["type"], "register");
    assert_eq!(sent[0]["deviceId"], "pi-test");
    assert!(sent[0]["hostname"].is_string());
    assert!(sent[0]["ipAddress"].is_string());
    link.agent.disconnect();
    link.thread.join().unwrap();
}

#[test]
fn heartbeat_sent_while_active() {
    let link = start(0);
    assert!(active(&link));
    assert!(wait_until(Duration::from_secs(3), || link.server.count_sent("ping") >= 1));
    let ping = link
        .server
        .sent()
        .into_iter()
        .find(|v| v["type"] == "ping")
        .unwrap();
    assert_eq!(ping, json!({"type": "ping", "deviceId": "pi-test"}));
    link.agent.disconnect();
    link.thread.join().unwrap();
}

#[test]
fn reconnects_until_draining() {
    let link = start(3);
    assert!(active(&link));
    assert_eq!(link.agent.attempts(), 4);
    assert_eq!(link.server.connects(), 1);

    link.server.drop_connection();
    assert!(wait_until(Duration::from_secs(5), || link.server.connects() == 2));
    assert!(active(&link));
    assert_eq!(link.server.count_sent("register"), 2);

    link.agent.disconnect();
    link.thread.join().unwrap();
    assert_eq!(link.agent.state(), ConnectionState::Draining);
    assert_eq!(link.server.connects(), 2);
    assert!(!link.queue.is_active());
}

#[test]
fn events_while_disconnected_are_dropped() {
    let link = start(0);
    assert!(active(&link));
    link.agent.disconnect();
    link.thread.join().unwrap();

    let before = link.server.sent().len();
    link.queue.emit(OutboundEvent::error_report("late", &[]));
    assert!(link.queue.try_next().is_none());
    assert_eq!(link.server.sent().len(), before);
}

#[test]
fn queued_events_reach_server_with_device_id() {
    let link = start(0);
    assert!(active(&link));
    link.queue.emit(OutboundEvent::TriggerFired {
        trigger_id: "t1".into(),
        trigger_name: "Door".into(),
    });
    assert!(wait_until(Duration::from_secs(2), || link.server.count_sent("trigger_fired") == 1));
    let fired = link
        .server
        .sent()
        .into_iter()
        .find(|v| v["type"] == "trigger_fired")
        .unwrap();
    assert_eq!(
        fired,
        json!({"type": "trigger_fired", "deviceId": "pi-test", "triggerId": "t1", "triggerName": "Door"})
    );
    link.agent.disconnect();
    link.thread.join().unwrap();
}

#[test]
fn bad_frames_are_skipped_and_session_survives() {
    let link = start(0);
    assert!(active(&link));
    link.server.push_raw("this is not json");
    link.server.push(json!({"no": "type"}));
    link.server.push(json!({"type": "pong"}));
    link.server.push(json!({"type": "error", "message": "device unknown"}));
    link.server.push(json!({"type": "firmware_update"}));
    link.server.push(json!({"type": "execute_trigger", "triggerId": "t9"}));

    assert!(wait_until(Duration::from_secs(2), || link.handler.commands().len() == 1));
    assert_eq!(
        link.handler.commands()[0],
        ControlCommand::ExecuteTrigger {
            trigger_id: "t9".into(),
            trigger_name: None,
            actions: Vec::new(),
        }
    );
    assert_eq!(link.agent.state(), ConnectionState::Active);
    assert_eq!(link.server.connects(), 1);
    link.agent.disconnect();
    link.thread.join().unwrap();
}

#[test]
fn disconnect_is_idempotent() {
    let link = start(0);
    assert!(active(&link));
    link.agent.disconnect();
    link.agent.disconnect();
    link.thread.join().unwrap();
    link.agent.disconnect();
    assert_eq!(link.agent.state(), ConnectionState::Draining);
}
