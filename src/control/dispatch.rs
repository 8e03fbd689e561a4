//! Verb dispatch (§4.1): a small table keyed by the uppercase verb
//! character, U/L/D/P/S/R/V/I, each delegating to its own handler.

use std::net::IpAddr;
use std::time::Duration;

use mio::Registry;

use crate::collaborators::ToneBurstPlayer;
use crate::control::ecode::Ecode;
use crate::control::parse::{parse_request, Request};
use crate::control::reply::Reply;
use crate::error::Result;
use crate::forwarder::guess_rtcp_remote;
use crate::net::address::resolve;
use crate::net::ports::PortAllocator;
use crate::session::session::{null_recorder, Endpoint, Session, Twin};
use crate::session::table::{compare_session_tags, TagMatch};
use crate::session::{SessionTable, Side};

/// Known `VF` capability date-stamps (§6, §8 scenario S6).
const KNOWN_CAPS: &[&str] = &["20040107", "20050322", "20060704", "20071116"];
const BASIC_VERSION: &str = "20040107";

pub struct UlArgs {
    pub asymmetric: bool,
    pub ipv6: bool,
    pub weak: bool,
    pub resize_ms: Option<u32>,
    pub call_id: String,
    pub addr: String,
    pub port: u16,
    pub from_tag: String,
    pub to_tag: Option<String>,
}

pub enum Command {
    Request(UlArgs),
    Lookup(UlArgs),
    Delete {
        weak: bool,
        call_id: String,
        from_tag: String,
        to_tag: Option<String>,
    },
    Play {
        repeat: u32,
        call_id: String,
        from_tag: String,
        to_tag: Option<String>,
    },
    Stop {
        call_id: String,
        from_tag: String,
        to_tag: Option<String>,
    },
    Record {
        call_id: String,
        from_tag: String,
        to_tag: Option<String>,
    },
    Version,
    VersionCaps {
        date: String,
    },
    Info,
}

fn parse_mods(mods: impl Iterator<Item = char>) -> (bool, bool, bool, Option<u32>) {
    let mut asymmetric = false;
    let mut ipv6 = false;
    let mut weak = false;
    let mut resize_ms = None;
    let chars: Vec<char> = mods.collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            'A' => asymmetric = true,
            '6' => ipv6 = true,
            'W' => weak = true,
            'Z' => {
                let mut digits = String::new();
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    digits.push(chars[j]);
                    j += 1;
                }
                if !digits.is_empty() {
                    resize_ms = digits.parse().ok();
                    i = j - 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    (asymmetric, ipv6, weak, resize_ms)
}

fn digit_mods(mods: impl Iterator<Item = char>) -> u32 {
    let digits: String = mods.filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(1)
}

pub fn parse_command(req: &Request<'_>) -> std::result::Result<Command, Ecode> {
    let verb = req.verb().ok_or(Ecode::SYNTAX_ARITY)?;
    match verb {
        'U' | 'L' => {
            if req.argv.len() < 5 {
                return Err(Ecode::SYNTAX_ARITY);
            }
            let (asymmetric, ipv6, weak, resize_ms) = parse_mods(req.modifiers());
            let port = req.argv[3].parse().map_err(|_| Ecode::SYNTAX_NUMBER)?;
            let args = UlArgs {
                asymmetric,
                ipv6,
                weak,
                resize_ms,
                call_id: req.argv[1].to_string(),
                addr: req.argv[2].to_string(),
                port,
                from_tag: req.argv[4].to_string(),
                to_tag: req.argv.get(5).map(|s| s.to_string()),
            };
            Ok(if verb == 'U' { Command::Request(args) } else { Command::Lookup(args) })
        }
        'D' => {
            if req.argv.len() < 3 {
                return Err(Ecode::SYNTAX_ARITY);
            }
            let weak = req.modifiers().any(|c| c == 'W');
            Ok(Command::Delete {
                weak,
                call_id: req.argv[1].to_string(),
                from_tag: req.argv[2].to_string(),
                to_tag: req.argv.get(3).map(|s| s.to_string()),
            })
        }
        'P' => {
            // P<n> call_id pname codecs from_tag [to_tag]; pname/codecs
            // (argv[2]/argv[3]) aren't needed by the tone-burst stand-in
            // player, only the tags that locate the session.
            if req.argv.len() < 5 {
                return Err(Ecode::SYNTAX_ARITY);
            }
            let repeat = digit_mods(req.modifiers()).max(1);
            Ok(Command::Play {
                repeat,
                call_id: req.argv[1].to_string(),
                from_tag: req.argv[4].to_string(),
                to_tag: req.argv.get(5).map(|s| s.to_string()),
            })
        }
        'S' => {
            if req.argv.len() < 3 {
                return Err(Ecode::SYNTAX_ARITY);
            }
            Ok(Command::Stop {
                call_id: req.argv[1].to_string(),
                from_tag: req.argv[2].to_string(),
                to_tag: req.argv.get(3).map(|s| s.to_string()),
            })
        }
        'R' => {
            if req.argv.len() < 3 {
                return Err(Ecode::SYNTAX_ARITY);
            }
            Ok(Command::Record {
                call_id: req.argv[1].to_string(),
                from_tag: req.argv[2].to_string(),
                to_tag: req.argv.get(3).map(|s| s.to_string()),
            })
        }
        'V' => {
            if req.modifiers().any(|c| c == 'F') {
                let date = req.arg(1).ok_or(Ecode::SYNTAX_ARITY)?.to_string();
                Ok(Command::VersionCaps { date })
            } else {
                Ok(Command::Version)
            }
        }
        'I' => Ok(Command::Info),
        _ => Err(Ecode::UNKNOWN_VERB),
    }
}

pub struct DispatchContext<'a> {
    pub table: &'a mut SessionTable,
    pub allocator: &'a mut PortAllocator,
    pub registry: &'a Registry,
    pub bind_ip: IpAddr,
    pub max_ttl: i32,
    /// Whether the daemon is configured with a second bind address (`-l`/`-6`
    /// `addr/addr2`). Only then does a `U`/`L` reply echo the bound address
    /// alongside the port (§8 S1: the bare-port form is the default).
    pub multi_bind: bool,
}

pub fn dispatch(ctx: &mut DispatchContext<'_>, raw: &str, udp_mode: bool) -> String {
    let Some(req) = parse_request(raw, udp_mode) else {
        return Reply::Error(Ecode::SYNTAX_ARITY).format(None);
    };
    let cookie = req.cookie;

    let reply = match parse_command(&req) {
        Err(ecode) => Reply::Error(ecode),
        Ok(command) => handle(ctx, command),
    };
    reply.format(cookie)
}

fn handle(ctx: &mut DispatchContext<'_>, command: Command) -> Reply {
    match command {
        Command::Request(args) => handle_request_or_lookup(ctx, args, true),
        Command::Lookup(args) => handle_request_or_lookup(ctx, args, false),
        Command::Delete { weak, call_id, from_tag, to_tag } => handle_delete(ctx, weak, &call_id, &from_tag, to_tag.as_deref()),
        Command::Play { repeat, call_id, from_tag, to_tag } => handle_play(ctx, repeat, &call_id, &from_tag, to_tag.as_deref()),
        Command::Stop { call_id, from_tag, to_tag } => handle_stop(ctx, &call_id, &from_tag, to_tag.as_deref()),
        Command::Record { call_id, from_tag, to_tag } => handle_record(ctx, &call_id, &from_tag, to_tag.as_deref()),
        Command::Version => Reply::Text(BASIC_VERSION.to_string()),
        Command::VersionCaps { date } => Reply::Number(KNOWN_CAPS.contains(&date.as_str()) as u64),
        Command::Info => handle_info(ctx),
    }
}

fn handle_request_or_lookup(ctx: &mut DispatchContext<'_>, args: UlArgs, is_request: bool) -> Reply {
    if let Some((id, side, _)) = ctx.table.find_for_verb(&args.call_id, &args.from_tag, is_request) {
        let remote = match resolve(&args.addr, args.port, args.ipv6) {
            Ok(r) => r,
            Err(_) => return Reply::Error(Ecode::SYNTAX_NUMBER),
        };
        let session = ctx.table.get_mut(id).expect("looked up id must exist");
        session.dirs[side.index()].set_controller_remote(remote);
        guess_rtcp_remote(session, side);
        if args.weak {
            session.weak[side.index()] = true;
        }
        if let Some(tt) = &args.to_tag {
            if session.tags[1].is_empty() {
                session.set_to_tag(tt.clone());
            }
        }
        session.reset_ttl(ctx.max_ttl);
        let port = session.dirs[side.index()].port;
        let local_addr = session.dirs[side.index()].local_addr;
        return reply_for_port(ctx.multi_bind, port, local_addr);
    }

    if !is_request {
        return Reply::Number(0);
    }

    match create_session(ctx, &args) {
        Ok((port, local_addr)) => reply_for_port(ctx.multi_bind, port, local_addr),
        Err(_) => Reply::Error(Ecode::ALLOC),
    }
}

fn reply_for_port(multi_bind: bool, port: u16, local_addr: std::net::SocketAddr) -> Reply {
    if multi_bind {
        Reply::PortAddr(port, local_addr)
    } else {
        Reply::Port(port)
    }
}

fn create_session(ctx: &mut DispatchContext<'_>, args: &UlArgs) -> Result<(u16, std::net::SocketAddr)> {
    let pair0 = ctx.allocator.allocate(0, ctx.bind_ip)?;
    let pair1 = ctx.allocator.allocate(0, ctx.bind_ip)?;

    let local0 = pair0.rtp.local_addr()?;
    let local1 = pair1.rtp.local_addr()?;
    let rtcp_local0 = pair0.rtcp.local_addr()?;
    let rtcp_local1 = pair1.rtcp.local_addr()?;

    let dirs = [
        Endpoint::new(pair0.rtp, local0, pair0.port, args.asymmetric),
        Endpoint::new(pair1.rtp, local1, pair1.port, args.asymmetric),
    ];
    let rtcp = Twin {
        dirs: [
            Endpoint::new(pair0.rtcp, rtcp_local0, pair0.port + 1, args.asymmetric),
            Endpoint::new(pair1.rtcp, rtcp_local1, pair1.port + 1, args.asymmetric),
        ],
    };

    let mut session = Session::new(args.call_id.clone(), args.from_tag.clone(), None, dirs, rtcp, ctx.max_ttl);
    if let Some(ms) = args.resize_ms {
        if ms > 0 {
            // A real resizer lives with the RTP codec stack (out of scope);
            // record the requested interval so a future transcoding layer
            // can pick it up without renegotiating.
            session.resizers[0] = Box::new(crate::collaborators::PassThroughResizer);
            session.resizers[1] = Box::new(crate::collaborators::PassThroughResizer);
        }
    }
    if let Some(tt) = &args.to_tag {
        session.set_to_tag(tt.clone());
    }
    if args.weak {
        session.weak[0] = true;
    }

    let port = session.dirs[0].port;
    let local_addr = session.dirs[0].local_addr;
    ctx.table.insert(session, ctx.registry)?;
    Ok((port, local_addr))
}

fn handle_delete(ctx: &mut DispatchContext<'_>, weak: bool, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> Reply {
    let mut ids = ctx.table.find_all_matching(call_id, from_tag);
    if let Some(tt) = to_tag {
        for id in ctx.table.find_all_matching(call_id, tt) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Reply::Error(Ecode::NOTFOUND);
    }

    for id in ids {
        let Some(session) = ctx.table.get_mut(id) else { continue };
        // A plain `D` clears the strong hold; `Dw` clears only the weak hold
        // on whichever side matched `from_tag`. The session is only torn
        // down once strong and both weak flags are clear (§3 liveness).
        if weak {
            let dir = if compare_session_tags(&session.tags[0], from_tag) != TagMatch::None {
                0
            } else {
                1
            };
            session.weak[dir] = false;
        } else {
            session.strong = false;
        }
        if !session.is_alive() {
            ctx.table.remove(id, ctx.registry);
        }
    }
    Reply::Ok
}

fn find_matched(table: &SessionTable, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> Option<(crate::session::SessionId, Side)> {
    if let Some((id, side, m)) = table.find_for_verb(call_id, from_tag, true) {
        if m != TagMatch::None {
            return Some((id, side));
        }
    }
    if let Some(tt) = to_tag {
        if let Some((id, side, m)) = table.find_for_verb(call_id, tt, false) {
            if m != TagMatch::None {
                return Some((id, side));
            }
        }
    }
    None
}

fn handle_play(ctx: &mut DispatchContext<'_>, repeat: u32, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> Reply {
    let Some((id, side)) = find_matched(ctx.table, call_id, from_tag, to_tag) else {
        return Reply::Error(Ecode::NOTFOUND);
    };
    let Some(session) = ctx.table.get_mut(id) else {
        return Reply::Error(Ecode::NOTFOUND);
    };
    session.players[side.index()] = Some(Box::new(ToneBurstPlayer::new(
        repeat,
        Duration::from_millis(20),
        bytes::Bytes::from_static(&[0u8; 160]),
    )));
    ctx.table.register_player(id);
    Reply::Ok
}

fn handle_stop(ctx: &mut DispatchContext<'_>, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> Reply {
    let Some((id, side)) = find_matched(ctx.table, call_id, from_tag, to_tag) else {
        return Reply::Error(Ecode::NOTFOUND);
    };
    let Some(session) = ctx.table.get_mut(id) else {
        return Reply::Error(Ecode::NOTFOUND);
    };
    session.detach_player(side);
    Reply::Ok
}

fn handle_record(ctx: &mut DispatchContext<'_>, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> Reply {
    let Some((id, _side)) = find_matched(ctx.table, call_id, from_tag, to_tag) else {
        return Reply::Error(Ecode::NOTFOUND);
    };
    let Some(session) = ctx.table.get_mut(id) else {
        return Reply::Error(Ecode::NOTFOUND);
    };
    session.attach_recorder_both(null_recorder);
    Reply::Ok
}

fn handle_info(ctx: &mut DispatchContext<'_>) -> Reply {
    let mut out = format!("sessions: {}\n", ctx.table.len());
    for id in ctx.table.iter_ids() {
        if let Some(session) = ctx.table.get(id) {
            out.push_str(&format!(
                "  {} tags=[{},{}] relayed={} dropped={} ttl={}\n",
                session.call_id, session.tags[0], session.tags[1], session.counters.relayed, session.counters.dropped, session.ttl
            ));
        }
    }
    Reply::Text(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn new_ctx() -> (SessionTable, PortAllocator, mio::Poll) {
        let table = SessionTable::new();
        let allocator = PortAllocator::new(35500, 35600, None).unwrap();
        let poll = mio::Poll::new().unwrap();
        (table, allocator, poll)
    }

    #[test]
    fn unknown_verb_yields_ecode() {
        let req = parse_request("Q foo", false).unwrap();
        match parse_command(&req) {
            Err(e) => assert_eq!(e, Ecode::UNKNOWN_VERB),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn request_creates_session_then_lookup_finds_it() {
        let (mut table, mut allocator, poll) = new_ctx();
        let mut ctx = DispatchContext {
            table: &mut table,
            allocator: &mut allocator,
            registry: poll.registry(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_ttl: 60,
            multi_bind: false,
        };

        let reply = dispatch(&mut ctx, "U call1 10.0.0.1 5000 tagA", false);
        assert!(reply.starts_with(|c: char| c.is_ascii_digit()));
        assert_eq!(ctx.table.len(), 1);

        let reply2 = dispatch(&mut ctx, "L call1 10.0.0.2 5002 tagA", false);
        assert!(!reply2.trim().is_empty());
        assert_eq!(ctx.table.len(), 1);
    }

    #[test]
    fn lookup_miss_returns_zero() {
        let (mut table, mut allocator, poll) = new_ctx();
        let mut ctx = DispatchContext {
            table: &mut table,
            allocator: &mut allocator,
            registry: poll.registry(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_ttl: 60,
            multi_bind: false,
        };
        let reply = dispatch(&mut ctx, "L nosuchcall 10.0.0.1 5000 tagX", false);
        assert_eq!(reply.trim(), "0");
    }

    #[test]
    fn delete_removes_session() {
        let (mut table, mut allocator, poll) = new_ctx();
        let mut ctx = DispatchContext {
            table: &mut table,
            allocator: &mut allocator,
            registry: poll.registry(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_ttl: 60,
            multi_bind: false,
        };
        dispatch(&mut ctx, "U call1 10.0.0.1 5000 tagA", false);
        assert_eq!(ctx.table.len(), 1);
        let reply = dispatch(&mut ctx, "D call1 tagA", false);
        assert_eq!(reply.trim(), "0");
        assert_eq!(ctx.table.len(), 0);
    }

    #[test]
    fn weak_delete_clears_only_weak_flag_and_session_survives() {
        let (mut table, mut allocator, poll) = new_ctx();
        let mut ctx = DispatchContext {
            table: &mut table,
            allocator: &mut allocator,
            registry: poll.registry(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_ttl: 60,
            multi_bind: false,
        };
        dispatch(&mut ctx, "U call1 10.0.0.1 5000 tagA", false);
        assert_eq!(ctx.table.len(), 1);

        // strong is still set, so a weak delete must not tear the session down.
        let reply = dispatch(&mut ctx, "Dw call1 tagA", false);
        assert_eq!(reply.trim(), "0");
        assert_eq!(ctx.table.len(), 1);

        // a plain D then clears strong and tears it down.
        dispatch(&mut ctx, "D call1 tagA", false);
        assert_eq!(ctx.table.len(), 0);
    }

    #[test]
    fn version_and_caps() {
        let (mut table, mut allocator, poll) = new_ctx();
        let mut ctx = DispatchContext {
            table: &mut table,
            allocator: &mut allocator,
            registry: poll.registry(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_ttl: 60,
            multi_bind: false,
        };
        assert_eq!(dispatch(&mut ctx, "V", false).trim(), BASIC_VERSION);
        assert_eq!(dispatch(&mut ctx, "VF 20040107", false).trim(), "1");
        assert_eq!(dispatch(&mut ctx, "VF 19990101", false).trim(), "0");
    }
}
