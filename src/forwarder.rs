//! The per-packet forwarding pipeline (§4.2).
//!
//! On every readable pollable descriptor the event loop drains up to
//! [`MAX_DRAIN`] datagrams (mirroring the source's bounded per-fd read loop,
//! which keeps one noisy stream from starving the others) and runs each one
//! through: authenticity check, address-update/NAT-learning (with RTCP-twin
//! port-guessing), count-and-relay (with the low-bitrate double-send), then
//! recording.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;

use crate::error::Result;
use crate::session::table::Part;
use crate::session::{Session, Side};

/// Datagrams drained per descriptor per event-loop iteration before moving
/// on, so one fast stream cannot starve the others.
pub const MAX_DRAIN: usize = 5;

/// Packets at or below this size get sent twice when `dmode` is enabled —
/// cheap redundancy against UDP loss for the small frames a low-bitrate
/// codec produces (§4.2 "dmode/LBR_THRS double-send").
pub const LBR_THRESHOLD: usize = 80;

const RECV_BUF: usize = 2048;

pub struct ForwardOptions {
    pub dmode: bool,
    pub lbr_threshold: usize,
    /// Whether RTCP packets get fed to the recorder attached by `R`, in
    /// addition to RTP (§6 `-R`: disable RTCP recording).
    pub record_rtcp: bool,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            dmode: false,
            lbr_threshold: LBR_THRESHOLD,
            record_rtcp: true,
        }
    }
}

/// Service one readable `(session, part)` pair: drain up to [`MAX_DRAIN`]
/// datagrams and run the forwarding pipeline on each.
pub fn service(session: &mut Session, part: Part, opts: &ForwardOptions, now: Instant) -> Result<()> {
    match part {
        Part::Primary(side) => drain(session, side, false, opts, now),
        Part::Twin(side) => drain(session, side, true, opts, now),
    }
}

fn drain(session: &mut Session, side: Side, is_rtcp: bool, opts: &ForwardOptions, now: Instant) -> Result<()> {
    let mut buf = [0u8; RECV_BUF];
    for _ in 0..MAX_DRAIN {
        let endpoint = if is_rtcp {
            &session.rtcp.dirs[side.index()]
        } else {
            &session.dirs[side.index()]
        };
        let Some(socket) = endpoint.socket.as_ref() else { return Ok(()) };

        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let packet = Bytes::copy_from_slice(&buf[..n]);
        pipeline(session, side, is_rtcp, src, packet, opts, now)?;
    }
    Ok(())
}

fn pipeline(
    session: &mut Session,
    side: Side,
    is_rtcp: bool,
    src: SocketAddr,
    packet: Bytes,
    opts: &ForwardOptions,
    now: Instant,
) -> Result<()> {
    if !authenticate_and_learn(session, side, is_rtcp, src) {
        session.counters.dropped += 1;
        return Ok(());
    }
    session.last_activity = now;

    if !is_rtcp {
        session.counters.input[side.index()] += 1;
    }

    let other = side.other();

    if !is_rtcp && session.players[other.index()].is_some() {
        // The outbound side is currently playing a prompt; suppress the
        // relay so the prompt isn't stepped on (§4.2 step 3).
        session.counters.dropped += 1;
        return Ok(());
    }

    let other_remote = if is_rtcp {
        session.rtcp.dirs[other.index()].remote_addr
    } else {
        session.dirs[other.index()].remote_addr
    };
    let Some(dest) = other_remote else {
        session.counters.dropped += 1;
        return Ok(());
    };

    let outgoing = if is_rtcp {
        vec![packet.clone()]
    } else {
        session.resizers[other.index()].push(&packet)
    };

    for out_packet in &outgoing {
        let socket = if is_rtcp {
            session.rtcp.dirs[other.index()].socket.as_ref()
        } else {
            session.dirs[other.index()].socket.as_ref()
        };
        if let Some(socket) = socket {
            send_with_dmode(socket, out_packet, dest, opts)?;
            if !is_rtcp {
                session.counters.relayed += 1;
            }
        }
    }

    if !is_rtcp || opts.record_rtcp {
        if let Some(recorder) = session.recorders[side.index()].as_mut() {
            recorder.record(&packet);
        }
    }

    Ok(())
}

/// Authenticity + NAT-learning (§3): a symmetric endpoint with `can_update`
/// set learns its remote address from the first (or next, after a
/// controller re-arm) packet it sees; otherwise traffic must match the
/// already-learned or controller-supplied remote. The RTCP twin guesses its
/// remote port as the RTP remote's port + 1 the first time it learns.
fn authenticate_and_learn(session: &mut Session, side: Side, is_rtcp: bool, src: SocketAddr) -> bool {
    let endpoint = if is_rtcp {
        &mut session.rtcp.dirs[side.index()]
    } else {
        &mut session.dirs[side.index()]
    };

    let (accepted, learned) = match endpoint.remote_addr {
        Some(expected) if !endpoint.can_update => {
            // Asymmetric endpoints tolerate the far end rebinding its source
            // port (NAT re-keying); symmetric endpoints, once locked, must
            // match exactly.
            let ok = if endpoint.asymmetric { expected.ip() == src.ip() } else { expected == src };
            (ok, false)
        }
        Some(_) | None => {
            endpoint.remote_addr = Some(src);
            endpoint.can_update = false;
            (true, true)
        }
    };

    if learned && !is_rtcp {
        guess_rtcp_remote(session, side);
    }
    accepted
}

fn send_with_dmode(socket: &mio::net::UdpSocket, packet: &Bytes, dest: SocketAddr, opts: &ForwardOptions) -> Result<()> {
    send_once(socket, packet, dest)?;
    if opts.dmode && packet.len() <= opts.lbr_threshold {
        send_once(socket, packet, dest)?;
    }
    Ok(())
}

fn send_once(socket: &mio::net::UdpSocket, packet: &Bytes, dest: SocketAddr) -> Result<()> {
    match socket.send_to(packet, dest) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Guess the RTCP twin's remote address from a learned RTP remote, per the
/// source's `port + 1` convention. Called by the control dispatcher right
/// after a `U`/`L` supplies a new RTP remote address, so a stream that never
/// sends RTCP still gets a sane default.
pub fn guess_rtcp_remote(session: &mut Session, side: Side) {
    if session.rtcp.dirs[side.index()].remote_addr.is_some() {
        return;
    }
    if let Some(rtp_remote) = session.dirs[side.index()].remote_addr {
        let guessed = SocketAddr::new(rtp_remote.ip(), rtp_remote.port() + 1);
        session.rtcp.dirs[side.index()].remote_addr = Some(guessed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Endpoint, Twin};
    use std::net::{IpAddr, Ipv4Addr};

    fn udp(port: u16) -> mio::net::UdpSocket {
        let std_sock = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
        std_sock.set_nonblocking(true).unwrap();
        mio::net::UdpSocket::from_std(std_sock)
    }

    fn make_session() -> Session {
        let a = udp(0);
        let la = a.local_addr().unwrap();
        let b = udp(0);
        let lb = b.local_addr().unwrap();
        let rtcp_a = udp(0);
        let rtcp_la = rtcp_a.local_addr().unwrap();
        let rtcp_b = udp(0);
        let rtcp_lb = rtcp_b.local_addr().unwrap();

        Session::new(
            "call1".into(),
            "fromtag".into(),
            None,
            [
                Endpoint::new(a, la, la.port(), false),
                Endpoint::new(b, lb, lb.port(), false),
            ],
            Twin {
                dirs: [
                    Endpoint::new(rtcp_a, rtcp_la, rtcp_la.port(), false),
                    Endpoint::new(rtcp_b, rtcp_lb, rtcp_lb.port(), false),
                ],
            },
            60,
        )
    }

    #[test]
    fn learns_remote_and_drops_until_relay_target_known() {
        let mut session = make_session();
        let src: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9000).into();
        let opts = ForwardOptions::default();
        pipeline(&mut session, Side::Callee, false, src, Bytes::from_static(b"rtp"), &opts, Instant::now()).unwrap();

        assert_eq!(session.dirs[0].remote_addr, Some(src));
        assert_eq!(session.counters.input[0], 1);
        assert_eq!(session.counters.dropped, 1);
    }

    #[test]
    fn relays_once_other_side_has_learned_a_remote() {
        let mut session = make_session();
        let caller_src: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9100).into();
        session.dirs[1].remote_addr = Some(caller_src);
        session.dirs[1].can_update = false;

        let callee_src: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9000).into();
        let opts = ForwardOptions::default();
        pipeline(&mut session, Side::Callee, false, callee_src, Bytes::from_static(b"rtp"), &opts, Instant::now()).unwrap();

        assert_eq!(session.counters.relayed, 1);
        assert_eq!(session.counters.dropped, 0);
    }

    #[test]
    fn rejects_spoofed_source_once_locked() {
        let mut session = make_session();
        let real: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9000).into();
        session.dirs[0].remote_addr = Some(real);
        session.dirs[0].can_update = false;

        let spoofed: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9999).into();
        assert!(!authenticate_and_learn(&mut session, Side::Callee, false, spoofed));
    }

    #[test]
    fn guesses_rtcp_remote_from_rtp_remote() {
        let mut session = make_session();
        let rtp_remote: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9000).into();
        session.dirs[0].remote_addr = Some(rtp_remote);
        guess_rtcp_remote(&mut session, Side::Callee);
        assert_eq!(session.rtcp.dirs[0].remote_addr.unwrap().port(), 9001);
    }

    #[test]
    fn asymmetric_endpoint_accepts_any_source_port_once_locked() {
        let mut session = make_session();
        session.dirs[0].asymmetric = true;
        let first: SocketAddr = (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 9000).into();
        session.dirs[0].remote_addr = Some(first);
        session.dirs[0].can_update = false;

        let rebind: SocketAddr = (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 9050).into();
        assert!(authenticate_and_learn(&mut session, Side::Callee, false, rebind));

        let other_host: SocketAddr = (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)), 9000).into();
        assert!(!authenticate_and_learn(&mut session, Side::Callee, false, other_host));
    }

    #[test]
    fn relay_to_a_playing_side_is_suppressed() {
        let mut session = make_session();
        let caller_src: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9100).into();
        session.dirs[1].remote_addr = Some(caller_src);
        session.dirs[1].can_update = false;
        session.players[1] = Some(Box::new(crate::collaborators::ToneBurstPlayer::new(
            1,
            std::time::Duration::from_millis(20),
            Bytes::from_static(&[0u8; 160]),
        )));

        let callee_src: SocketAddr = (IpAddr::V4(Ipv4Addr::LOCALHOST), 9000).into();
        let opts = ForwardOptions::default();
        pipeline(&mut session, Side::Callee, false, callee_src, Bytes::from_static(b"rtp"), &opts, Instant::now()).unwrap();

        assert_eq!(session.counters.relayed, 0);
        assert_eq!(session.counters.dropped, 1);
    }
}
