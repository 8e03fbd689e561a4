//! Even/odd RTP+RTCP port-pair allocator.
//!
//! Generalizes a rotating linear-scan allocator (bind, catch `EADDRINUSE`,
//! advance the cursor) from single ports to even/odd pairs: find two free
//! consecutive ports `(p, p+1)` with `p` even, starting from a rotating
//! cursor, wrapping at `port_max` back to `port_min` exactly once.

use std::io;
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Socket, Type};

use crate::error::{Error, Result};

/// A bound RTP/RTCP socket pair plus the RTP (even) port chosen.
pub struct PortPair {
    pub rtp: mio::net::UdpSocket,
    pub rtcp: mio::net::UdpSocket,
    pub port: u16,
}

/// Rotating cursor allocator over `[port_min, port_max]`.
///
/// `next[0]`/`next[1]` track the two bind addresses of bridging mode
/// (`bmode`); single-bind configurations only ever use index 0.
pub struct PortAllocator {
    port_min: u16,
    port_max: u16,
    next: [u16; 2],
    tos: Option<u32>,
}

impl PortAllocator {
    pub fn new(port_min: u16, port_max: u16, tos: Option<u32>) -> Result<Self> {
        if port_min % 2 != 0 || port_max % 2 != 0 || port_min >= port_max {
            return Err(Error::config(format!(
                "invalid RTP port range {port_min}-{port_max}: bounds must be even and port_min < port_max"
            )));
        }
        Ok(Self {
            port_min,
            port_max,
            next: [port_min, port_min],
            tos,
        })
    }

    pub fn port_min(&self) -> u16 {
        self.port_min
    }

    pub fn port_max(&self) -> u16 {
        self.port_max
    }

    /// Allocate a free RTP/RTCP pair bound to `bind_ip`, using cursor `j`
    /// (0 = primary/external bind address, 1 = internal bind address in
    /// bridging mode).
    pub fn allocate(&mut self, j: usize, bind_ip: IpAddr) -> Result<PortPair> {
        let candidates = ((self.port_max - self.port_min) / 2 + 1) as usize;
        let mut port = self.next[j];

        for _ in 0..candidates {
            match self.try_bind_pair(bind_ip, port) {
                Ok(pair) => {
                    self.next[j] = Self::advance(port, self.port_min, self.port_max);
                    return Ok(pair);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    port = Self::advance(port, self.port_min, self.port_max);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Err(Error::ListenerExhausted)
    }

    fn advance(port: u16, min: u16, max: u16) -> u16 {
        if port >= max {
            min
        } else {
            port + 2
        }
    }

    fn try_bind_pair(&self, bind_ip: IpAddr, port: u16) -> io::Result<PortPair> {
        let rtp_std = self.bind_one(bind_ip, port)?;
        let rtcp_std = match self.bind_one(bind_ip, port + 1) {
            Ok(s) => s,
            Err(e) => return Err(e),
        };
        Ok(PortPair {
            rtp: mio::net::UdpSocket::from_std(rtp_std),
            rtcp: mio::net::UdpSocket::from_std(rtcp_std),
            port,
        })
    }

    fn bind_one(&self, bind_ip: IpAddr, port: u16) -> io::Result<std::net::UdpSocket> {
        let domain = if bind_ip.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_nonblocking(true)?;
        if let (IpAddr::V4(_), Some(tos)) = (bind_ip, self.tos) {
            socket.set_tos(tos)?;
        }
        socket.bind(&SocketAddr::new(bind_ip, port).into())?;
        Ok(socket.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn allocates_even_odd_pair() {
        let mut alloc = PortAllocator::new(35000, 35100, None).unwrap();
        let pair = alloc.allocate(0, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_eq!(pair.port % 2, 0);
        assert!(pair.port >= 35000 && pair.port <= 35100);
    }

    #[test]
    fn cursor_advances_and_skips_taken_port() {
        let mut alloc = PortAllocator::new(35200, 35260, None).unwrap();
        let first = alloc.allocate(0, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let second = alloc.allocate(0, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_ne!(first.port, second.port);
        assert!(second.port > first.port || second.port == alloc.port_min());
    }

    #[test]
    fn rejects_odd_bounds() {
        assert!(PortAllocator::new(35001, 35100, None).is_err());
        assert!(PortAllocator::new(35000, 35101, None).is_err());
    }
}
