//! UDP/UDP6 control socket: one command per datagram, cookie echoed back in
//! the reply per §4.1/§6.

use std::io::ErrorKind;
use std::net::SocketAddr;

use crate::control::DispatchContext;
use crate::error::Result;

const RECV_BUF: usize = 4096;

pub struct UdpControl {
    socket: mio::net::UdpSocket,
}

impl UdpControl {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let std_sock = std::net::UdpSocket::bind(addr)?;
        std_sock.set_nonblocking(true)?;
        Ok(Self {
            socket: mio::net::UdpSocket::from_std(std_sock),
        })
    }

    pub fn socket_mut(&mut self) -> &mut mio::net::UdpSocket {
        &mut self.socket
    }

    pub fn service(&mut self, ctx: &mut DispatchContext<'_>) -> Result<()> {
        let mut buf = [0u8; RECV_BUF];
        loop {
            let (n, src) = match self.socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let raw = String::from_utf8_lossy(&buf[..n]);
            let response = crate::control::dispatch(ctx, &raw, true);
            let _ = self.socket.send_to(response.as_bytes(), src);
        }
    }
}
