//! Connection agent: the server session state machine.
//!
//! ```text
//!  Disconnected ─▶ Connecting ─▶ Registered ─▶ Active
//!       ▲                                        │ fault / close
//!       └──────────── reconnect delay ◀──────────┘
//!
//!  disconnect() from any state ─▶ Draining (terminal)
//! ```
//!
//! Each session runs on one thread with an `edge-executor` driving four
//! cooperative tasks; the first one to finish ends the session:
//!
//! 1. **Heartbeat** sends `ping` every interval via an `async-io-mini` timer
//! 2. **Receive** polls the transport, decodes and dispatches commands
//! 3. **Writer** wakes on the outbound queue and sends each event
//! 4. **Drain watch** ends the session once a disconnect is requested

use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use core::time::Duration;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use futures_lite::FutureExt;
use log::{debug, info, warn};

use super::channels::OutboundQueue;
use super::codec::{InboundMessage, decode_inbound, encode_outbound};
use super::transport::{Connector, Transport};
use crate::adapters::identity::HostIdentity;
use crate::app::events::OutboundEvent;
use crate::app::ports::ControlHandler;
use crate::config::AgentConfig;
use crate::drivers::worker::spawn_worker;
use crate::error::{Error, TransportError};

const LINK_STACK_KB: usize = 512;
/// Receive poll interval when no frame is pending.
const RECV_POLL: Duration = Duration::from_millis(10);
/// How often an active session checks for a disconnect request.
const DRAIN_POLL: Duration = Duration::from_millis(20);
/// Granularity of the cancellable reconnect sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Registered = 2,
    Active = 3,
    Draining = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Registered,
            3 => Self::Active,
            4 => Self::Draining,
            _ => Self::Disconnected,
        }
    }
}

struct Shared {
    state: AtomicU8,
    attempts: AtomicU32,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn draining(&self) -> bool {
        self.state() == ConnectionState::Draining
    }

    /// Move to `next` unless draining.  Returns `false` if draining.
    fn advance(&self, next: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != ConnectionState::Draining as u8).then_some(next as u8)
            })
            .is_ok()
    }
}

/// Cloneable view of a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    shared: Arc<Shared>,
}

impl AgentHandle {
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Relaxed)
    }

    /// Request shutdown.  The active session (if any) ends at its next
    /// await point and no reconnect is attempted.
    pub fn disconnect(&self) {
        let prev = self
            .shared
            .state
            .swap(ConnectionState::Draining as u8, Ordering::AcqRel);
        if prev != ConnectionState::Draining as u8 {
            info!("Link: disconnect requested");
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Fault(TransportError),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown"),
            Self::Fault(e) => write!(f, "{e}"),
        }
    }
}

pub struct ConnectionAgent {
    device_id: String,
    server_url: String,
    server_addr: Option<(String, u16)>,
    heartbeat: Duration,
    reconnect_delay: Duration,
    connector: Box<dyn Connector>,
    handler: Arc<dyn ControlHandler>,
    queue: Arc<OutboundQueue>,
    shared: Arc<Shared>,
}

impl ConnectionAgent {
    pub fn new(
        config: &AgentConfig,
        connector: Box<dyn Connector>,
        handler: Arc<dyn ControlHandler>,
        queue: Arc<OutboundQueue>,
    ) -> Self {
        let server_addr = url::Url::parse(&config.server_url).ok().and_then(|u| {
            let host = u.host_str()?.to_string();
            Some((host, u.port_or_known_default()?))
        });
        Self {
            device_id: config.device_id.clone(),
            server_url: config.server_url.clone(),
            server_addr,
            heartbeat: config.heartbeat_interval(),
            reconnect_delay: config.reconnect_delay(),
            connector,
            handler,
            queue,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                attempts: AtomicU32::new(0),
            }),
        }
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the agent on its own thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        spawn_worker("link", LINK_STACK_KB, move || self.run())
    }

    /// Connect, serve, reconnect; returns once a disconnect is requested.
    pub fn run(mut self) {
        info!("Link: server {}", self.server_url);
        while self.shared.advance(ConnectionState::Connecting) {
            let attempt = self.shared.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Link: connection attempt {}", attempt);
            match self.connector.connect(&self.server_url) {
                Ok(transport) => {
                    let end = self.serve(transport);
                    info!("Link: session ended ({})", end);
                }
                Err(e) => warn!("Link: {}", e),
            }
            self.queue.set_active(false);
            if !self.shared.advance(ConnectionState::Disconnected) {
                break;
            }
            info!(
                "Link: reconnecting in {}s",
                self.reconnect_delay.as_secs_f32()
            );
            self.sleep_unless_draining(self.reconnect_delay);
        }
        self.queue.set_active(false);
        info!("Link: stopped");
    }

    fn sleep_unless_draining(&self, total: Duration) {
        // Past the clock's range means "until disconnect".
        let deadline = Instant::now().checked_add(total);
        while !self.shared.draining() {
            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        break;
                    }
                    SLEEP_SLICE.min(left)
                }
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }

    /// One connected session: register, then run the cooperative tasks.
    fn serve(&self, transport: Box<dyn Transport>) -> SessionEnd {
        let session = Session {
            device_id: &self.device_id,
            transport: RefCell::new(transport),
            handler: self.handler.as_ref(),
            queue: &self.queue,
            shared: &self.shared,
            heartbeat: self.heartbeat,
        };
        let end = session.run(self.server_addr.as_ref());
        session.transport.borrow_mut().close();
        end
    }
}

struct Session<'a> {
    device_id: &'a str,
    transport: RefCell<Box<dyn Transport>>,
    handler: &'a dyn ControlHandler,
    queue: &'a OutboundQueue,
    shared: &'a Shared,
    heartbeat: Duration,
}

impl Session<'_> {
    fn run(&self, server: Option<&(String, u16)>) -> SessionEnd {
        let identity = HostIdentity::discover(server.map(|(h, p)| (h.as_str(), *p)));
        let register = OutboundEvent::Registration {
            hostname: identity.hostname,
            ip_address: identity.ip_address,
        };
        if let Err(e) = self.send(&register) {
            return SessionEnd::Fault(e);
        }
        if !self.shared.advance(ConnectionState::Registered) {
            return SessionEnd::Shutdown;
        }
        info!("Link: registered as '{}'", self.device_id);

        self.queue.drain();
        self.queue.set_active(true);
        if !self.shared.advance(ConnectionState::Active) {
            return SessionEnd::Shutdown;
        }

        let executor: LocalExecutor<'_, 8> = LocalExecutor::new();
        futures_lite::future::block_on(executor.run(async {
            let heartbeat = executor.spawn(self.heartbeat_loop());
            let receive = executor.spawn(self.receive_loop());
            let writer = executor.spawn(self.writer_loop());
            let watch = executor.spawn(self.drain_watch());
            heartbeat.or(receive).or(writer).or(watch).await
        }))
    }

    fn send(&self, event: &OutboundEvent) -> Result<(), TransportError> {
        let text = encode_outbound(self.device_id, event)?;
        self.transport.borrow_mut().send(&text)
    }

    async fn heartbeat_loop(&self) -> SessionEnd {
        loop {
            Timer::after(self.heartbeat).await;
            if let Err(e) = self.send(&OutboundEvent::Heartbeat) {
                return SessionEnd::Fault(e);
            }
            debug!("Link: ping");
        }
    }

    async fn receive_loop(&self) -> SessionEnd {
        loop {
            let frame = self.transport.borrow_mut().recv();
            match frame {
                Ok(Some(text)) => {
                    self.dispatch(&text);
                    futures_lite::future::yield_now().await;
                }
                Ok(None) => {
                    Timer::after(RECV_POLL).await;
                }
                Err(TransportError::Decode(e)) => warn!("Link: skipping frame: {}", e),
                Err(e) => return SessionEnd::Fault(e),
            }
        }
    }

    async fn writer_loop(&self) -> SessionEnd {
        loop {
            let event = self.queue.next().await;
            match self.send(&event) {
                Ok(()) => {}
                Err(TransportError::Encode(e)) => warn!("Link: cannot encode {}: {}", event.kind(), e),
                Err(e) => return SessionEnd::Fault(e),
            }
        }
    }

    async fn drain_watch(&self) -> SessionEnd {
        while !self.shared.draining() {
            Timer::after(DRAIN_POLL).await;
        }
        SessionEnd::Shutdown
    }

    fn dispatch(&self, text: &str) {
        match decode_inbound(text) {
            Ok(InboundMessage::Command(command)) => {
                info!("Link: received {}", command.label());
                self.handler.handle(command);
            }
            Ok(InboundMessage::Pong) => debug!("Link: pong"),
            Ok(InboundMessage::ServerError(message)) => {
                warn!("Link: {}", Error::RemoteReject(message));
            }
            Ok(InboundMessage::Unrecognized(kind)) => {
                info!("Link: ignoring message type '{}'", kind);
            }
            Err(e) => warn!("Link: skipping frame: {}", e),
        }
    }
}
