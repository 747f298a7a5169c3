//! End-to-end behaviour: server config in, pin activity and events out.

use std::time::{Duration, Instant};

use serde_json::json;

use pinagent::app::events::OutboundEvent;

use crate::mocks::wait_until;
use crate::rig::Rig;

fn door_buzzer() -> serde_json::Value {
    json!([{
        "id": "door",
        "name": "Front door",
        "type": "hardware-edge",
        "config": { "pin": 17, "edge": "falling", "pull": "up", "debounce": 50 },
        "actions": [{
            "id": "buzz",
            "name": "Buzzer",
            "type": "set-output",
            "config": { "pin": 27, "state": "high", "duration": 200 }
        }]
    }])
}

#[test]
fn door_edge_pulses_buzzer_and_reports() {
    let rig = Rig::start();
    rig.load(door_buzzer(), 1);
    assert_eq!(rig.hw.subscribed_inputs(), vec![17]);

    let pressed = Instant::now();
    assert!(rig.hw.simulate_edge(17, false));
    assert!(wait_until(Duration::from_secs(1), || rig.backend.level(27) == Some(true)));
    assert!(wait_until(Duration::from_secs(2), || rig.backend.level(27) == Some(false)));
    assert!(pressed.elapsed() >= Duration::from_millis(200));

    assert!(wait_until(Duration::from_secs(2), || {
        rig.server.count_sent("action_executed") == 1
    }));
    let sent = rig.server.sent();
    let fired = sent.iter().find(|v| v["type"] == "trigger_fired").unwrap();
    assert_eq!(fired["triggerId"], "door");
    assert_eq!(fired["triggerName"], "Front door");
    let executed = sent.iter().find(|v| v["type"] == "action_executed").unwrap();
    assert_eq!(executed["actionId"], "buzz");
    assert_eq!(executed["actionName"], "Buzzer");
    assert_eq!(executed["success"], true);
}

#[test]
fn rising_edge_ignored_by_falling_trigger() {
    let rig = Rig::start();
    rig.load(door_buzzer(), 1);
    assert!(!rig.hw.simulate_edge(17, true));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.recorded.count("trigger_fired"), 0);
}

#[test]
fn reload_retires_previous_triggers() {
    let rig = Rig::start();
    rig.load(door_buzzer(), 1);
    rig.load(
        json!([{
            "id": "remote",
            "name": "Remote only",
            "type": "remote-command",
            "config": {},
            "actions": []
        }]),
        1,
    );
    assert!(wait_until(Duration::from_secs(1), || rig.registry.loaded_ids() == vec!["remote"]));
    assert!(rig.hw.subscribed_inputs().is_empty());
    assert!(!rig.backend.is_claimed(17));
    assert!(!rig.registry.fire_by_id("door"));

    assert!(!rig.hw.simulate_edge(17, false));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.recorded.count("trigger_fired"), 0);
}

#[test]
fn execute_trigger_runs_loaded_sequence() {
    let rig = Rig::start();
    rig.load(door_buzzer(), 1);
    rig.server.push(json!({"type": "execute_trigger", "triggerId": "door"}));
    assert!(wait_until(Duration::from_secs(2), || rig.recorded.count("action_executed") == 1));
    assert_eq!(rig.recorded.count("trigger_fired"), 1);
}

#[test]
fn execute_trigger_with_inline_actions() {
    let rig = Rig::start();
    rig.server.push(json!({
        "type": "execute_trigger",
        "triggerId": "adhoc",
        "triggerName": "Ad hoc",
        "actions": [{
            "id": "hook",
            "name": "Webhook",
            "type": "http-call",
            "config": { "url": "http://hooks.local/ring", "body": {"who": "door"} }
        }]
    }));
    assert!(wait_until(Duration::from_secs(2), || rig.recorded.count("action_executed") == 1));
    let requests = rig.http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://hooks.local/ring");
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].body, Some(json!({"who": "door"})));
    assert!(rig.recorded.events().contains(&OutboundEvent::TriggerFired {
        trigger_id: "adhoc".into(),
        trigger_name: "Ad hoc".into(),
    }));
}

#[test]
fn execute_unknown_trigger_reports_error() {
    let rig = Rig::start();
    rig.server.push(json!({"type": "execute_trigger", "triggerId": "ghost"}));
    assert!(wait_until(Duration::from_secs(2), || rig.server.count_sent("error") == 1));
    let err = rig
        .server
        .sent()
        .into_iter()
        .find(|v| v["type"] == "error")
        .unwrap();
    assert_eq!(err["error"], "unknown trigger");
    assert_eq!(err["context"], json!({"trigger": "ghost"}));
}

#[test]
fn bad_entries_reported_and_rest_loaded() {
    let rig = Rig::start();
    rig.load(
        json!([
            {
                "id": "nightly",
                "name": "Bad schedule",
                "type": "schedule",
                "config": { "cron": "abc" },
                "actions": []
            },
            {
                "id": "lunch",
                "name": "Lunch bell",
                "type": "schedule",
                "config": { "cron": "30 14 * * *" },
                "actions": [
                    { "id": "a1", "name": "Nap", "type": "delay", "config": {} },
                    { "id": "a2", "name": "Bell", "type": "set-output", "config": { "pin": 5, "state": "high" } }
                ]
            }
        ]),
        1,
    );
    assert_eq!(rig.registry.loaded_ids(), vec!["lunch"]);
    assert_eq!(rig.registry.scheduled_count(), 1);
    assert!(wait_until(Duration::from_secs(2), || rig.server.count_sent("error") == 2));
    let contexts: Vec<_> = rig
        .server
        .sent()
        .into_iter()
        .filter(|v| v["type"] == "error")
        .map(|v| v["context"].clone())
        .collect();
    assert!(contexts.contains(&json!({"trigger": "nightly"})));
    assert!(contexts.contains(&json!({"trigger": "lunch", "action": "Nap"})));
}

#[test]
fn schedule_fires_when_clock_reaches_time() {
    let rig = Rig::start();
    rig.load(
        json!([{
            "id": "lunch",
            "name": "Lunch bell",
            "type": "schedule",
            "config": { "cron": "30 14 * * *" },
            "actions": [
                { "id": "bell", "name": "Bell", "type": "set-output", "config": { "pin": 5, "state": "high" } }
            ]
        }]),
        1,
    );
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.recorded.count("trigger_fired"), 0);

    rig.clock.set(14, 30);
    assert!(wait_until(Duration::from_secs(2), || rig.backend.level(5) == Some(true)));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.recorded.count("trigger_fired"), 1);
}

#[test]
fn null_config_clears_triggers() {
    let rig = Rig::start();
    rig.load(door_buzzer(), 1);
    rig.server.push(json!({"type": "config", "config": null}));
    assert!(wait_until(Duration::from_secs(2), || rig.registry.loaded_ids().is_empty()));
    assert!(rig.hw.subscribed_inputs().is_empty());
}

#[test]
fn shutdown_releases_pins() {
    let mut rig = Rig::start();
    rig.load(door_buzzer(), 1);
    rig.stop();
    assert!(!rig.backend.is_claimed(17));
    assert!(rig.hw.subscribed_inputs().is_empty());
}
