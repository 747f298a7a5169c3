//! A fully wired agent over mock adapters.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;
use std::time::Duration;

use pinagent::adapters::log_sink::TeeSink;
use pinagent::adapters::sim_gpio::SimulatedBackend;
use pinagent::app::actions::ActionEngine;
use pinagent::app::ports::{ControlHandler, EventSink};
use pinagent::app::triggers::TriggerRegistry;
use pinagent::config::AgentConfig;
use pinagent::drivers::gpio::HardwareIo;
use pinagent::link::{AgentHandle, ConnectionAgent, ConnectionState, OutboundQueue};

use crate::mocks::{ManualClock, MockHttp, MockServer, RecordingSink, wait_until};

pub struct Rig {
    pub server: MockServer,
    pub backend: Arc<SimulatedBackend>,
    pub hw: Arc<HardwareIo>,
    pub http: Arc<MockHttp>,
    pub recorded: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<TriggerRegistry>,
    pub link: AgentHandle,
    link_thread: Option<JoinHandle<()>>,
}

pub fn config() -> AgentConfig {
    AgentConfig {
        device_id: "pi-test".into(),
        server_url: "ws://127.0.0.1:3001".into(),
        heartbeat_interval_secs: 1,
        reconnect_delay_secs: 0,
        simulation: true,
        ..AgentConfig::default()
    }
}

#[allow(dead_code)]
impl Rig {
    pub fn start() -> Self {
        Self::start_with(config(), 0)
    }

    /// Wire the agent and wait for it to become `Active`.
    pub fn start_with(config: AgentConfig, refused_connects: usize) -> Self {
        let server = MockServer::new();
        let backend = Arc::new(SimulatedBackend::new());
        let hw = Arc::new(HardwareIo::new(backend.clone(), Duration::from_millis(5)));
        let http = Arc::new(MockHttp::new(200));
        let queue = Arc::new(OutboundQueue::new());
        let recorded = Arc::new(RecordingSink::default());
        let sink: Arc<dyn EventSink> = Arc::new(TeeSink(queue.clone(), recorded.clone()));
        let engine = Arc::new(ActionEngine::new(
            hw.clone(),
            http.clone(),
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        ));
        let clock = Arc::new(ManualClock::at(8, 0));
        let registry = Arc::new(TriggerRegistry::new(
            hw.clone(),
            engine,
            sink,
            clock.clone(),
            Duration::from_millis(20),
        ));
        registry.start().unwrap();

        let handler: Arc<dyn ControlHandler> = registry.clone();
        let agent = ConnectionAgent::new(&config, server.connector(refused_connects), handler, queue);
        let link = agent.handle();
        let link_thread = Some(agent.spawn().unwrap());

        let rig = Self {
            server,
            backend,
            hw,
            http,
            recorded,
            clock,
            registry,
            link,
            link_thread,
        };
        assert!(
            wait_until(Duration::from_secs(5), || rig.link.state() == ConnectionState::Active),
            "agent never became active"
        );
        rig
    }

    /// Push a config message and wait for the expected trigger count.
    pub fn load(&self, triggers: serde_json::Value, expected: usize) {
        self.server.push(serde_json::json!({
            "type": "config",
            "config": { "deviceName": "Test Pi", "triggers": triggers },
        }));
        assert!(
            wait_until(Duration::from_secs(2), || self.registry.loaded_ids().len() == expected),
            "config never loaded: {:?}",
            self.registry.loaded_ids()
        );
    }

    pub fn stop(&mut self) {
        self.link.disconnect();
        if let Some(thread) = self.link_thread.take() {
            thread.join().unwrap();
        }
        self.registry.shutdown();
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.stop();
    }
}
