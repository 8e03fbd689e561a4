//! Session data model (§3): two directions, an RTCP twin, liveness flags,
//! NAT-learning state and the collaborator slots (resizer/player/recorder).

use std::net::SocketAddr;
use std::time::Instant;

use crate::collaborators::{NullRecorder, PassThroughResizer, Player, Recorder, Resizer};

/// Which call leg a direction belongs to. Index 0 is conventionally the
/// callee, index 1 the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Callee = 0,
    Caller = 1,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Callee => Side::Caller,
            Side::Caller => Side::Callee,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Side {
        match i {
            0 => Side::Callee,
            1 => Side::Caller,
            _ => unreachable!("direction index out of range: {i}"),
        }
    }
}

/// `pcount[in, relayed, dropped]`. `input` is per direction; `relayed` and
/// `dropped` are session-wide totals (invariant 4, §8: never decrease).
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCounters {
    pub input: [u64; 2],
    pub relayed: u64,
    pub dropped: u64,
}

/// One pollable endpoint: a bound UDP socket plus its NAT-learning state.
pub struct Endpoint {
    pub socket: Option<mio::net::UdpSocket>,
    pub local_addr: SocketAddr,
    pub port: u16,
    pub remote_addr: Option<SocketAddr>,
    pub asymmetric: bool,
    pub can_update: bool,
}

impl Endpoint {
    pub fn new(socket: mio::net::UdpSocket, local_addr: SocketAddr, port: u16, asymmetric: bool) -> Self {
        Self {
            socket: Some(socket),
            local_addr,
            port,
            remote_addr: None,
            asymmetric,
            can_update: !asymmetric,
        }
    }

    /// Set the remote endpoint as supplied by the controller (`U`/`L`),
    /// re-arming `can_update` per §3: `NOT(asymmetric)`.
    pub fn set_controller_remote(&mut self, remote: SocketAddr) {
        self.remote_addr = Some(remote);
        self.can_update = !self.asymmetric;
    }
}

/// The RTCP twin of a primary session: identical shape, `port+1`, no TTL of
/// its own (reaped only through the primary, invariant 3).
pub struct Twin {
    pub dirs: [Endpoint; 2],
}

/// One media stream between two call legs (§3).
pub struct Session {
    pub call_id: String,
    pub tags: [String; 2],
    pub medianum: Option<u32>,
    pub dirs: [Endpoint; 2],
    pub rtcp: Twin,
    pub counters: PacketCounters,
    pub strong: bool,
    pub weak: [bool; 2],
    pub ttl: i32,
    pub resizers: [Box<dyn Resizer>; 2],
    pub players: [Option<Box<dyn Player>>; 2],
    pub recorders: [Option<Box<dyn Recorder>>; 2],
    pub last_activity: Instant,
}

impl Session {
    pub fn new(
        call_id: String,
        from_tag: String,
        medianum: Option<u32>,
        dirs: [Endpoint; 2],
        rtcp: Twin,
        max_ttl: i32,
    ) -> Self {
        Self {
            call_id,
            tags: [from_tag, String::new()],
            medianum,
            dirs,
            rtcp,
            counters: PacketCounters::default(),
            strong: true,
            weak: [false, false],
            ttl: max_ttl,
            resizers: [Box::new(PassThroughResizer), Box::new(PassThroughResizer)],
            players: [None, None],
            recorders: [None, None],
            last_activity: Instant::now(),
        }
    }

    pub fn set_to_tag(&mut self, to_tag: String) {
        self.tags[1] = to_tag;
    }

    /// Liveness: torn down once strong and both weak flags are clear.
    pub fn is_alive(&self) -> bool {
        self.strong || self.weak[0] || self.weak[1]
    }

    pub fn has_player(&self) -> bool {
        self.players[0].is_some() || self.players[1].is_some()
    }

    pub fn reset_ttl(&mut self, max_ttl: i32) {
        self.ttl = max_ttl;
        self.last_activity = Instant::now();
    }

    pub fn attach_recorder_both(&mut self, make: impl Fn() -> Box<dyn Recorder>) {
        self.recorders[0] = Some(make());
        self.recorders[1] = Some(make());
    }

    pub fn detach_player(&mut self, side: Side) {
        self.players[side.index()] = None;
    }
}

pub fn null_recorder() -> Box<dyn Recorder> {
    Box::new(NullRecorder)
}
