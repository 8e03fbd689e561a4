//! TTL reaper (§4.4): once per second, decrement every primary session's TTL
//! and tear it down on expiry. Twins have no TTL of their own and are reaped
//! only through their primary (invariant 3).

use mio::Registry;

use crate::session::{SessionId, SessionTable};

/// Run one reaper tick: decrement `ttl` on every session, tearing down (and
/// returning the ids of) those that expire.
pub fn tick(table: &mut SessionTable, registry: &Registry) -> Vec<SessionId> {
    let ids: Vec<SessionId> = table.iter_ids().collect();
    let mut expired = Vec::new();

    for id in ids {
        let Some(session) = table.get_mut(id) else { continue };
        if session.ttl <= 0 {
            expired.push(id);
        } else {
            session.ttl -= 1;
        }
    }

    for id in &expired {
        table.remove(*id, registry);
    }

    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Endpoint, Twin};
    use std::net::Ipv4Addr;

    fn udp() -> mio::net::UdpSocket {
        let std_sock = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        std_sock.set_nonblocking(true).unwrap();
        mio::net::UdpSocket::from_std(std_sock)
    }

    fn make_session(ttl: i32) -> crate::session::Session {
        let a = udp();
        let la = a.local_addr().unwrap();
        let b = udp();
        let lb = b.local_addr().unwrap();
        let rtcp_a = udp();
        let rtcp_la = rtcp_a.local_addr().unwrap();
        let rtcp_b = udp();
        let rtcp_lb = rtcp_b.local_addr().unwrap();

        crate::session::Session::new(
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
            ttl,
        )
    }

    #[test]
    fn expires_session_whose_ttl_reaches_zero() {
        let mut table = SessionTable::new();
        let poll = mio::Poll::new().unwrap();
        let id = table.insert(make_session(2), poll.registry()).unwrap();

        // ttl=2: two ticks of no input only count it down to zero; the
        // session is torn down on the tick *after* that (max_ttl + 1 ticks).
        assert!(tick(&mut table, poll.registry()).is_empty());
        assert_eq!(table.len(), 1);
        assert!(tick(&mut table, poll.registry()).is_empty());
        assert_eq!(table.len(), 1);

        let expired = tick(&mut table, poll.registry());
        assert_eq!(expired, vec![id]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn long_lived_session_survives_several_ticks() {
        let mut table = SessionTable::new();
        let poll = mio::Poll::new().unwrap();
        table.insert(make_session(60), poll.registry()).unwrap();

        for _ in 0..5 {
            assert!(tick(&mut table, poll.registry()).is_empty());
        }
        assert_eq!(table.len(), 1);
    }
}
