//! Mock adapters shared by the integration tests.
//!
//! - [`MockServer`] hands out scripted in-memory transports and records
//!   every frame the agent sends.
//! - [`MockHttp`] records requests and answers with a fixed status.
//! - [`RecordingSink`] / [`RecordingHandler`] capture what the domain
//!   emits and what the link dispatches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use pinagent::app::commands::ControlCommand;
use pinagent::app::events::OutboundEvent;
use pinagent::app::model::HttpRequest;
use pinagent::app::ports::{Clock, ControlHandler, EventSink, HttpPort};
use pinagent::error::{ActionFault, TransportError};
use pinagent::link::{Connector, Transport};

/// Poll `cond` every 5 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ── Server side ───────────────────────────────────────────────

#[derive(Default)]
struct Wire {
    inbound: VecDeque<String>,
    sent: Vec<String>,
    connects: usize,
    session: usize,
    killed_session: Option<usize>,
}

/// In-memory stand-in for the control server.
#[derive(Clone, Default)]
pub struct MockServer {
    wire: Arc<Mutex<Wire>>,
}

#[allow(dead_code)]
impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector that refuses the first `failures` attempts.
    pub fn connector(&self, failures: usize) -> Box<dyn Connector> {
        Box::new(MockConnector {
            wire: Arc::clone(&self.wire),
            failures,
        })
    }

    /// Queue a raw inbound frame.
    pub fn push_raw(&self, text: &str) {
        self.wire.lock().unwrap().inbound.push_back(text.to_string());
    }

    /// Queue a JSON inbound frame.
    pub fn push(&self, value: Value) {
        self.push_raw(&value.to_string());
    }

    /// Every frame the agent sent, parsed.
    pub fn sent(&self) -> Vec<Value> {
        self.wire
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// `type` of every frame sent, in order.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count_sent(&self, kind: &str) -> usize {
        self.sent_types().iter().filter(|t| *t == kind).count()
    }

    /// Successful connections so far.
    pub fn connects(&self) -> usize {
        self.wire.lock().unwrap().connects
    }

    /// Break the current session; the agent sees `Closed` on its next I/O.
    pub fn drop_connection(&self) {
        let mut wire = self.wire.lock().unwrap();
        wire.killed_session = Some(wire.session);
    }
}

struct MockConnector {
    wire: Arc<Mutex<Wire>>,
    failures: usize,
}

impl Connector for MockConnector {
    fn connect(&mut self, _url: &str) -> Result<Box<dyn Transport>, TransportError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }
        let mut wire = self.wire.lock().unwrap();
        wire.connects += 1;
        wire.session += 1;
        Ok(Box::new(MockTransport {
            wire: Arc::clone(&self.wire),
            session: wire.session,
            closed: false,
        }))
    }
}

struct MockTransport {
    wire: Arc<Mutex<Wire>>,
    session: usize,
    closed: bool,
}

impl MockTransport {
    fn alive(&self, wire: &Wire) -> bool {
        !self.closed && wire.killed_session != Some(self.session)
    }
}

impl Transport for MockTransport {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().unwrap();
        if !self.alive(&wire) {
            return Err(TransportError::Closed);
        }
        wire.sent.push(text.to_string());
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<String>, TransportError> {
        let mut wire = self.wire.lock().unwrap();
        if !self.alive(&wire) {
            return Err(TransportError::Closed);
        }
        Ok(wire.inbound.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

// ── Domain side ───────────────────────────────────────────────

/// Records every emitted event.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<OutboundEvent>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: OutboundEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Records dispatched commands.
#[derive(Default)]
pub struct RecordingHandler(Mutex<Vec<ControlCommand>>);

#[allow(dead_code)]
impl RecordingHandler {
    pub fn commands(&self) -> Vec<ControlCommand> {
        self.0.lock().unwrap().clone()
    }
}

impl ControlHandler for RecordingHandler {
    fn handle(&self, command: ControlCommand) {
        self.0.lock().unwrap().push(command);
    }
}

/// HTTP port answering every request with a fixed status.
pub struct MockHttp {
    status: AtomicU16,
    requests: Mutex<Vec<HttpRequest>>,
}

#[allow(dead_code)]
impl MockHttp {
    pub fn new(status: u16) -> Self {
        Self {
            status: AtomicU16::new(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpPort for MockHttp {
    fn send(&self, request: &HttpRequest) -> Result<u16, ActionFault> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.status.load(Ordering::Relaxed))
    }
}

/// Clock frozen at a settable instant.
pub struct ManualClock(Mutex<Option<NaiveDateTime>>);

#[allow(dead_code)]
impl ManualClock {
    pub fn at(hour: u32, minute: u32) -> Self {
        Self(Mutex::new(Some(today(hour, minute))))
    }

    pub fn set(&self, hour: u32, minute: u32) {
        *self.0.lock().unwrap() = Some(today(hour, minute));
    }
}

fn today(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

impl Clock for ManualClock {
    fn now(&self) -> Option<NaiveDateTime> {
        *self.0.lock().unwrap()
    }
}
