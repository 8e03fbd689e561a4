//! Host:port parsing and rendering for the control protocol.
//!
//! The wire protocol never sends a combined `host:port` pair — `addr` and
//! `port` arrive as separate tokens (see `control::parse`) — so this module
//! only needs to turn a bare host literal plus a numeric port into a
//! [`SocketAddr`], and to render one back out the way replies expect it:
//! the bare address, with a trailing `6` token when the family is IPv6.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};

/// Parse `host` as either an IPv4 or IPv6 literal, per the `6` modifier on
/// `U`/`L`, and pair it with `port` into a [`SocketAddr`].
pub fn resolve(host: &str, port: u16, as_ipv6: bool) -> Result<SocketAddr> {
    let ip = if as_ipv6 {
        host.parse::<Ipv6Addr>()
            .map(IpAddr::V6)
            .map_err(|_| Error::syntax(format!("not an IPv6 address: {host}")))?
    } else {
        host.parse::<Ipv4Addr>()
            .map(IpAddr::V4)
            .map_err(|_| Error::syntax(format!("not an IPv4 address: {host}")))?
    };
    Ok(SocketAddr::new(ip, port))
}

/// Render the bare host portion of `addr`, without the port, as it appears
/// in a `<port> <addr>[ 6]` reply.
pub fn format_host(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

pub fn is_v6(addr: &SocketAddr) -> bool {
    addr.is_ipv6()
}
