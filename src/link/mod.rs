//! Server link: wire codec, transports and the connection agent.

pub mod agent;
pub mod channels;
pub mod codec;
pub mod transport;
pub mod ws;

pub use agent::{AgentHandle, ConnectionAgent, ConnectionState};
pub use channels::OutboundQueue;
pub use transport::{Connector, Transport};
