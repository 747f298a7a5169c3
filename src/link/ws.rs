//! WebSocket transport over `tungstenite`.
//!
//! The TCP connection is opened here with an explicit timeout, then
//! handed to tungstenite for the (optionally TLS) handshake.  Once
//! connected, reads use a short socket timeout so `recv` returns
//! `Ok(None)` instead of blocking the connection executor.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::transport::{Connector, Transport};
use crate::error::TransportError;

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket read timeout during the HTTP upgrade / TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket read timeout once connected (receive poll granularity).
const POLL_TIMEOUT: Duration = Duration::from_millis(5);

pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

fn resolve(url: &Url) -> Result<SocketAddr, TransportError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::ConnectFailed(format!("no host in '{url}'")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| TransportError::ConnectFailed(format!("no port for '{url}'")))?;
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::ConnectFailed(format!("resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| TransportError::ConnectFailed(format!("{host} has no address")))
}

fn set_read_timeout(stream: &MaybeTlsStream<TcpStream>, timeout: Duration) -> io::Result<()> {
    match stream {
        MaybeTlsStream::Plain(s) => s.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(s) => s.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

impl Connector for WsConnector {
    fn connect(&mut self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let addr = resolve(&parsed)?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| TransportError::ConnectFailed(format!("{addr}: {e}")))?;
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (socket, response) = tungstenite::client_tls(url, stream)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        set_read_timeout(socket.get_ref(), POLL_TIMEOUT)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        info!("Link: WebSocket open to {} ({})", addr, response.status());
        Ok(Box::new(WsTransport { socket }))
    }
}

pub struct WsTransport {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

fn map_ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}

impl Transport for WsTransport {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.to_string()))
            .map_err(map_ws_error)
    }

    fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(text)),
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| TransportError::Decode("binary frame is not UTF-8".into())),
            Ok(Message::Close(frame)) => {
                debug!("Link: close frame {:?}", frame);
                Err(TransportError::Closed)
            }
            // Ping replies are queued by tungstenite and flushed on the next read/write.
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => Err(map_ws_error(e)),
        }
    }

    fn close(&mut self) {
        if self.socket.can_write() {
            let _ = self.socket.close(None);
            let _ = self.socket.flush();
        }
    }
}
