//! Host identity reported at registration.
//!
//! The hostname comes from the kernel (`/proc/sys/kernel/hostname`,
//! falling back to `/etc/hostname`).  The IP address is the local
//! address the kernel would route to the control server from, falling
//! back to resolving our own hostname.  Either one is `"unknown"` when
//! it cannot be determined; registration never fails because of it.

use std::fs;
use std::net::{IpAddr, ToSocketAddrs, UdpSocket};

/// Placeholder for identity fields that cannot be determined.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip_address: String,
}

impl HostIdentity {
    /// Gather the identity, using `server` (`host:port`) to pick the
    /// outbound interface.
    pub fn discover(server: Option<(&str, u16)>) -> Self {
        let hostname = hostname();
        let ip_address = server
            .and_then(|(host, port)| route_address(host, port))
            .or_else(|| resolve_ipv4(&hostname))
            .map_or_else(|| UNKNOWN.to_string(), |ip| ip.to_string());
        Self {
            hostname,
            ip_address,
        }
    }
}

/// Kernel hostname, or `"unknown"`.
pub fn hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Local address of the interface routing to `host:port`.  A UDP
/// `connect` only selects a route; nothing is sent.
fn route_address(host: &str, port: u16) -> Option<IpAddr> {
    let target = (host, port).to_socket_addrs().ok()?.find(|a| a.is_ipv4())?;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(target).ok()?;
    let local = socket.local_addr().ok()?.ip();
    (!local.is_unspecified()).then_some(local)
}

fn resolve_ipv4(hostname: &str) -> Option<IpAddr> {
    if hostname == UNKNOWN {
        return None;
    }
    (hostname, 0)
        .to_socket_addrs()
        .ok()?
        .map(|a| a.ip())
        .find(IpAddr::is_ipv4)
}
