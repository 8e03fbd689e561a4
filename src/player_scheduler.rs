//! Player scheduling (§4.3): walk `rtp_servers[]` once per event-loop
//! iteration, poll every attached player, forward what it produces and
//! detach it on EOF, compacting holes lazily as they appear.

use std::time::Instant;

use crate::collaborators::PlayerPoll;
use crate::forwarder::{ForwardOptions, LBR_THRESHOLD};
use crate::session::{SessionId, SessionTable, Side};

/// Poll every session with an attached player and forward whatever it
/// produced. Returns the number of active (non-hole) entries remaining.
pub fn process_rtp_servers(table: &mut SessionTable, opts: &ForwardOptions, now: Instant) -> usize {
    let ids: Vec<SessionId> = table.rtp_servers.iter().flatten().copied().collect();
    let mut remaining = 0;

    for id in ids {
        let Some(session) = table.get_mut(id) else {
            clear_hole(table, id);
            continue;
        };

        let mut any_player = false;
        for side in [Side::Callee, Side::Caller] {
            let Some(player) = session.players[side.index()].as_mut() else { continue };
            any_player = true;
            match player.poll(now) {
                PlayerPoll::Later => {}
                PlayerPoll::Eof => {
                    session.detach_player(side);
                }
                PlayerPoll::Datagram(packet) => {
                    if let Some(dest) = session.dirs[side.index()].remote_addr {
                        if let Some(socket) = session.dirs[side.index()].socket.as_ref() {
                            let _ = socket.send_to(&packet, dest);
                            if opts.dmode && packet.len() <= LBR_THRESHOLD {
                                let _ = socket.send_to(&packet, dest);
                            }
                            session.counters.relayed += 1;
                        }
                    }
                }
            }
        }

        if any_player && session.has_player() {
            remaining += 1;
        } else {
            clear_hole(table, id);
        }
    }

    remaining
}

fn clear_hole(table: &mut SessionTable, id: SessionId) {
    for entry in table.rtp_servers.iter_mut() {
        if *entry == Some(id) {
            *entry = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ToneBurstPlayer;
    use crate::session::{Endpoint, Twin};
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    fn udp() -> mio::net::UdpSocket {
        let std_sock = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        std_sock.set_nonblocking(true).unwrap();
        mio::net::UdpSocket::from_std(std_sock)
    }

    fn make_session_with_listener() -> (crate::session::Session, std::net::UdpSocket) {
        let listener = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.set_nonblocking(true).unwrap();
        let dest: SocketAddr = listener.local_addr().unwrap();

        let a = udp();
        let la = a.local_addr().unwrap();
        let b = udp();
        let lb = b.local_addr().unwrap();
        let rtcp_a = udp();
        let rtcp_la = rtcp_a.local_addr().unwrap();
        let rtcp_b = udp();
        let rtcp_lb = rtcp_b.local_addr().unwrap();

        let mut session = crate::session::Session::new(
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
        );
        session.dirs[0].remote_addr = Some(IpAddr::V4(Ipv4Addr::LOCALHOST).into());
        session.dirs[0].remote_addr = Some(dest);
        (session, listener)
    }

    #[test]
    fn detaches_player_after_eof_and_compacts_hole() {
        let (mut session, listener) = make_session_with_listener();
        session.players[0] = Some(Box::new(ToneBurstPlayer::new(1, Duration::from_millis(0), Bytes::from_static(b"x"))));

        let mut table = SessionTable::new();
        let poll = mio::Poll::new().unwrap();
        let id = table.insert(session, poll.registry()).unwrap();
        table.register_player(id);

        let opts = ForwardOptions::default();
        let now = Instant::now();
        let remaining = process_rtp_servers(&mut table, &opts, now);
        assert_eq!(remaining, 1);

        let mut buf = [0u8; 64];
        assert!(listener.recv_from(&mut buf).is_ok());

        let remaining2 = process_rtp_servers(&mut table, &opts, now);
        assert_eq!(remaining2, 0);
        assert!(table.rtp_servers.iter().all(|e| e.is_none()));
    }
}
