//! The single-threaded event loop (§4.5): timeout selection, `poll()`,
//! player scheduling, forwarding, control dispatch, and the 1 Hz TTL
//! reaper, run cooperatively with nothing but local state — no mutexes, no
//! atomics, no second thread.

use std::io;
use std::time::{Duration, Instant};

use mio::{Events, Poll};
use tracing::{debug, info, warn};

use crate::config::{ControlSpec, RuntimeConfig};
use crate::control::DispatchContext;
use crate::forwarder::{self, ForwardOptions, LBR_THRESHOLD};
use crate::net::ports::PortAllocator;
use crate::player_scheduler;
use crate::reaper;
use crate::session::table::{decode_token, CONTROL_TOKEN};
use crate::session::SessionTable;
use crate::signals::{Signal, SignalHandler};
use crate::transport::udp::UdpControl;
use crate::transport::unix::UnixControl;
use crate::transport::ControlChannel;
use crate::Result;

/// Never wait longer than this between `poll()` calls, so the TTL reaper's
/// 1 Hz tick and signal polling both stay responsive.
const MAX_POLL_WAIT: Duration = Duration::from_secs(1);
/// Never spin tighter than this, even with a steady backlog of events.
const MIN_POLL_WAIT: Duration = Duration::from_millis(1);
const REAPER_PERIOD: Duration = Duration::from_secs(1);
const MAX_EVENTS: usize = 256;

pub struct EventLoop {
    poll: Poll,
    events: Events,
    table: SessionTable,
    allocator: PortAllocator,
    control: ControlChannel,
    signals: SignalHandler,
    forward_opts: ForwardOptions,
    bind_ip: std::net::IpAddr,
    max_ttl: i32,
    multi_bind: bool,
    last_reaper_tick: Instant,
    running: bool,
}

impl EventLoop {
    pub fn new(cfg: &RuntimeConfig) -> Result<Self> {
        let poll = Poll::new()?;
        let allocator = PortAllocator::new(cfg.port_min, cfg.port_max, cfg.tos)?;

        let mut control = match &cfg.control {
            ControlSpec::Unix(path) => ControlChannel::Unix(UnixControl::bind(path)?),
            ControlSpec::Udp(addr) => ControlChannel::Udp(UdpControl::bind(*addr)?),
            ControlSpec::Udp6(addr) => ControlChannel::Udp(UdpControl::bind(*addr)?),
        };
        control.register(poll.registry())?;

        let signals = SignalHandler::install()?;

        let multi_bind = matches!(cfg.listen, Some((_, Some(_)))) || matches!(cfg.listen6, Some((_, Some(_))));

        Ok(Self {
            poll,
            events: Events::with_capacity(MAX_EVENTS),
            table: SessionTable::new(),
            allocator,
            control,
            signals,
            forward_opts: ForwardOptions {
                dmode: cfg.dmode,
                lbr_threshold: LBR_THRESHOLD,
                record_rtcp: !cfg.no_rtcp_record,
            },
            bind_ip: cfg.bind_ip(),
            max_ttl: cfg.max_ttl,
            multi_bind,
            last_reaper_tick: Instant::now(),
            running: true,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        info!("event loop starting");
        while self.running {
            self.tick_signals();
            if !self.running {
                break;
            }
            let now = Instant::now();
            let timeout = self.next_timeout(now);

            match self.poll.poll(&mut self.events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            let now = Instant::now();
            player_scheduler::process_rtp_servers(&mut self.table, &self.forward_opts, now);
            self.service_events(now)?;
            self.tick_reaper(now);
        }
        info!("event loop stopped");
        Ok(())
    }

    fn tick_signals(&mut self) {
        match self.signals.poll() {
            Some(Signal::Shutdown) => {
                info!("shutdown signal received");
                self.running = false;
            }
            Some(Signal::Reload) => debug!("reload signal received (log rotation handled by the appender)"),
            Some(Signal::Usr1) => debug!("SIGUSR1 received"),
            Some(Signal::Usr2) => debug!("SIGUSR2 received"),
            None => {}
        }
    }

    fn next_timeout(&self, now: Instant) -> Duration {
        let since_tick = now.saturating_duration_since(self.last_reaper_tick);
        let until_tick = REAPER_PERIOD.saturating_sub(since_tick);
        until_tick.clamp(MIN_POLL_WAIT, MAX_POLL_WAIT)
    }

    fn service_events(&mut self, now: Instant) -> Result<()> {
        let tokens: Vec<_> = self.events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == CONTROL_TOKEN {
                let mut ctx = DispatchContext {
                    table: &mut self.table,
                    allocator: &mut self.allocator,
                    registry: self.poll.registry(),
                    bind_ip: self.bind_ip,
                    max_ttl: self.max_ttl,
                    multi_bind: self.multi_bind,
                };
                if let Err(e) = self.control.service(&mut ctx) {
                    warn!(error = %e, "control channel service error");
                }
                continue;
            }

            let Some((id, part)) = decode_token(token) else { continue };
            let Some(session) = self.table.get_mut(id) else { continue };
            if let Err(e) = forwarder::service(session, part, &self.forward_opts, now) {
                warn!(error = %e, "forwarding error");
            }
        }
        Ok(())
    }

    fn tick_reaper(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_reaper_tick) < REAPER_PERIOD {
            return;
        }
        self.last_reaper_tick = now;
        let expired = reaper::tick(&mut self.table, self.poll.registry());
        if !expired.is_empty() {
            debug!(count = expired.len(), "reaped expired sessions");
        }
    }

    pub fn control_channel_path(&mut self) -> Option<&std::path::Path> {
        match &mut self.control {
            ControlChannel::Unix(c) => Some(c.path()),
            ControlChannel::Udp(_) => None,
        }
    }

    pub fn shutdown(&mut self) {
        if let ControlChannel::Unix(c) = &self.control {
            c.unlink();
        }
        self.control.deregister(self.poll.registry());
    }
}
