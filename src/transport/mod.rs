//! The control channel (§4.5 step 6, §6): either a UNIX stream socket or a
//! UDP/UDP6 datagram socket, both servicing `Token(0)` in the event loop.

pub mod udp;
pub mod unix;

use mio::{Interest, Registry, Token};

use crate::control::DispatchContext;
use crate::error::Result;
use crate::session::table::CONTROL_TOKEN;

pub enum ControlChannel {
    Unix(unix::UnixControl),
    Udp(udp::UdpControl),
}

impl ControlChannel {
    pub fn register(&mut self, registry: &Registry) -> Result<()> {
        match self {
            ControlChannel::Unix(c) => registry.register(c.listener_mut(), CONTROL_TOKEN, Interest::READABLE)?,
            ControlChannel::Udp(c) => registry.register(c.socket_mut(), CONTROL_TOKEN, Interest::READABLE)?,
        }
        Ok(())
    }

    pub fn deregister(&mut self, registry: &Registry) {
        match self {
            ControlChannel::Unix(c) => {
                let _ = registry.deregister(c.listener_mut());
            }
            ControlChannel::Udp(c) => {
                let _ = registry.deregister(c.socket_mut());
            }
        }
    }

    /// Service one pending command on `Token(0)`, exactly once (the event
    /// loop re-polls to pick up any remaining backlog).
    pub fn service(&mut self, ctx: &mut DispatchContext<'_>) -> Result<()> {
        match self {
            ControlChannel::Unix(c) => c.service(ctx),
            ControlChannel::Udp(c) => c.service(ctx),
        }
    }

    pub fn token(&self) -> Token {
        CONTROL_TOKEN
    }
}
