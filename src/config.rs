//! CLI parsing and the validated runtime configuration it produces (§6).
//!
//! `Args` mirrors the command line flag-for-flag; [`RuntimeConfig::from_args`]
//! is the only place that rejects a malformed combination (bad port range,
//! unparsable listen address, malformed `-s` spec) so every other module
//! gets to assume it already holds valid, immutable settings.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "rtprelayd", version, about = "Single-threaded RTP/RTCP media relay daemon")]
pub struct Args {
    /// Stay in the foreground instead of daemonizing.
    #[arg(short = 'f')]
    pub foreground: bool,

    /// Double-send packets at or under the low-bitrate threshold, cheap
    /// redundancy against UDP loss for small frames.
    #[arg(short = '2')]
    pub dmode: bool,

    /// Disable RTCP recording (`R` still records RTP either way).
    #[arg(short = 'R')]
    pub no_rtcp_record: bool,

    /// IPv4 listen address(es) for RTP/RTCP, `addr` or `addr/addr2` to bridge
    /// between two independent address pairs.
    #[arg(short = 'l')]
    pub listen: Option<String>,

    /// IPv6 listen address(es), same `addr[/addr2]` shape as `-l`.
    #[arg(short = '6')]
    pub listen6: Option<String>,

    /// Control socket spec: `unix:/path`, `udp:host:port` or `udp6:host:port`.
    #[arg(short = 's')]
    pub control: String,

    /// IP_TOS value applied to RTP/RTCP sockets.
    #[arg(short = 't')]
    pub tos: Option<u32>,

    /// Directory to write recordings into; omit to disable recording.
    #[arg(short = 'r')]
    pub record_dir: Option<PathBuf>,

    /// Directory to read prompt/tone files from for the `P` command.
    #[arg(short = 'S')]
    pub sound_dir: Option<PathBuf>,

    /// Default session TTL in seconds.
    #[arg(short = 'T', default_value_t = 60)]
    pub ttl: i32,

    /// Raise the open-file-descriptor limit to this many.
    #[arg(short = 'L')]
    pub max_files: Option<u64>,

    /// Lower bound of the RTP/RTCP port range (even).
    #[arg(short = 'm', default_value_t = 35000)]
    pub port_min: u16,

    /// Upper bound of the RTP/RTCP port range (even).
    #[arg(short = 'M', default_value_t = 65000)]
    pub port_max: u16,

    /// Write the daemon's PID to this file.
    #[arg(short = 'p')]
    pub pidfile: Option<PathBuf>,

    /// Verbose (debug-level) logging.
    #[arg(short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub enum ControlSpec {
    Unix(PathBuf),
    Udp(SocketAddr),
    Udp6(SocketAddr),
}

fn parse_control_spec(raw: &str) -> Result<ControlSpec> {
    if let Some(path) = raw.strip_prefix("unix:") {
        return Ok(ControlSpec::Unix(PathBuf::from(path)));
    }
    if let Some(rest) = raw.strip_prefix("udp6:") {
        return rest
            .parse::<SocketAddr>()
            .map(ControlSpec::Udp6)
            .map_err(|_| Error::config(format!("invalid udp6 control spec: {raw}")));
    }
    if let Some(rest) = raw.strip_prefix("udp:") {
        return rest
            .parse::<SocketAddr>()
            .map(ControlSpec::Udp)
            .map_err(|_| Error::config(format!("invalid udp control spec: {raw}")));
    }
    Err(Error::config(format!(
        "control spec must start with unix:, udp: or udp6: (got {raw})"
    )))
}

fn parse_pair<T: std::str::FromStr>(raw: &str) -> Result<(T, Option<T>)> {
    let mut parts = raw.splitn(2, '/');
    let first = parts
        .next()
        .unwrap()
        .parse()
        .map_err(|_| Error::config(format!("invalid address: {raw}")))?;
    let second = match parts.next() {
        Some(s) => Some(s.parse().map_err(|_| Error::config(format!("invalid address: {raw}")))?),
        None => None,
    };
    Ok((first, second))
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub foreground: bool,
    pub dmode: bool,
    pub no_rtcp_record: bool,
    pub listen: Option<(Ipv4Addr, Option<Ipv4Addr>)>,
    pub listen6: Option<(Ipv6Addr, Option<Ipv6Addr>)>,
    pub control: ControlSpec,
    pub tos: Option<u32>,
    pub record_dir: Option<PathBuf>,
    pub sound_dir: Option<PathBuf>,
    pub max_ttl: i32,
    pub max_files: Option<u64>,
    pub port_min: u16,
    pub port_max: u16,
    pub pidfile: Option<PathBuf>,
    pub verbose: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        if args.port_min % 2 != 0 || args.port_max % 2 != 0 || args.port_min >= args.port_max {
            return Err(Error::config(format!(
                "port range must be even and ascending: {}-{}",
                args.port_min, args.port_max
            )));
        }

        let listen = match &args.listen {
            Some(raw) => Some(parse_pair::<Ipv4Addr>(raw)?),
            None => None,
        };
        let listen6 = match &args.listen6 {
            Some(raw) => Some(parse_pair::<Ipv6Addr>(raw)?),
            None => None,
        };
        let control = parse_control_spec(&args.control)?;

        Ok(Self {
            foreground: args.foreground,
            dmode: args.dmode,
            no_rtcp_record: args.no_rtcp_record,
            listen,
            listen6,
            control,
            tos: args.tos,
            record_dir: args.record_dir,
            sound_dir: args.sound_dir,
            max_ttl: args.ttl,
            max_files: args.max_files,
            port_min: args.port_min,
            port_max: args.port_max,
            pidfile: args.pidfile,
            verbose: args.verbose,
        })
    }

    /// Default bind address the port allocator should use when neither `-l`
    /// nor `-6` was given: loopback, so a fresh install can still come up.
    pub fn bind_ip(&self) -> IpAddr {
        if let Some((addr, _)) = self.listen {
            IpAddr::V4(addr)
        } else if let Some((addr, _)) = self.listen6 {
            IpAddr::V6(addr)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
