//! Wire-formatting replies (§4.1, §6): `[<cookie> ]<body>\n`.

use std::net::SocketAddr;

use crate::control::ecode::Ecode;
use crate::net::address::{format_host, is_v6};

#[derive(Debug, Clone)]
pub enum Reply {
    /// Port-only reply to a plain `U`/`L` (no RTCP-address echo needed).
    Port(u16),
    /// Port + local address, as returned once the controller has asked for
    /// the bound address too.
    PortAddr(u16, SocketAddr),
    /// Bare success, rendered as `0` (also used for `D`/`S`/`R`/`P`).
    Ok,
    /// A bare number: `L`'s not-found case and `VF`'s capability check both
    /// happen to render this way.
    Number(u64),
    Error(Ecode),
    /// Multi-line free text, used by `I`.
    Text(String),
}

impl Reply {
    pub fn format(&self, cookie: Option<&str>) -> String {
        let body = match self {
            Reply::Port(p) => p.to_string(),
            Reply::PortAddr(p, addr) => {
                let host = format_host(addr);
                if is_v6(addr) {
                    format!("{p} {host} 6")
                } else {
                    format!("{p} {host}")
                }
            }
            Reply::Ok => "0".to_string(),
            Reply::Number(n) => n.to_string(),
            Reply::Error(code) => code.to_string(),
            Reply::Text(s) => s.clone(),
        };
        match cookie {
            Some(c) => format!("{c} {body}\n"),
            None => format!("{body}\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn formats_ok_without_cookie() {
        assert_eq!(Reply::Ok.format(None), "0\n");
    }

    #[test]
    fn formats_error_with_cookie() {
        assert_eq!(Reply::Error(Ecode::NOTFOUND).format(Some("77")), "77 E8\n");
    }

    #[test]
    fn formats_port_addr_v4() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 35000);
        assert_eq!(Reply::PortAddr(35000, addr).format(None), "35000 10.0.0.1\n");
    }
}
