//! Narrow-contract traits for the components this crate treats as external
//! collaborators: the RTP repacketizer, the synthetic prompt player and the
//! recording sink. Real deployments plug in a real repacketizer/codec stack
//! and a real recorder; this crate only needs the contracts below to drive
//! the forwarder and player scheduler, so the default implementations here
//! are deliberately minimal (pass-through / no-op).

use bytes::Bytes;

/// Outcome of asking a [`Player`] for its next datagram, mirroring the
/// source's `RTPS_LATER` / `RTPS_EOF` / positive-length contract.
pub enum PlayerPoll {
    /// Nothing to send yet.
    Later,
    /// Playback complete; detach this player.
    Eof,
    /// Send this datagram now.
    Datagram(Bytes),
}

/// A synthetic RTP source attached by the `P` command.
pub trait Player: Send {
    /// Ask for the next datagram given the current time. Implementations
    /// pace themselves against wall-clock time; the scheduler applies no
    /// rate limiting beyond honoring [`PlayerPoll::Later`].
    fn poll(&mut self, now: std::time::Instant) -> PlayerPoll;
}

/// Reframes RTP payloads to a target duration, parameterized by
/// `output_nsamples` (see `Z<ms>` on `U`/`L`). `output_nsamples == 0` means
/// pass-through: forward every packet unchanged, exactly once.
pub trait Resizer: Send {
    fn output_nsamples(&self) -> u32;
    /// Feed one inbound packet; return zero or more reframed outbound
    /// packets, retrieved synchronously.
    fn push(&mut self, packet: &Bytes) -> Vec<Bytes>;
}

/// Pass-through resizer used whenever no `Z<ms>` modifier was given.
pub struct PassThroughResizer;

impl Resizer for PassThroughResizer {
    fn output_nsamples(&self) -> u32 {
        0
    }

    fn push(&mut self, packet: &Bytes) -> Vec<Bytes> {
        vec![packet.clone()]
    }
}

/// Sink for in/out packet recording, attached by the `R` command.
pub trait Recorder: Send {
    fn record(&mut self, packet: &Bytes);
}

/// Discards everything; used in configurations with no recording directory.
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record(&mut self, _packet: &Bytes) {}
}

/// Trivial fixed-repeat tone player: emits `repeat` silence datagrams of
/// `interval` spacing then reports EOF. Stands in for a real prompt/codec
/// player in tests and minimal deployments.
pub struct ToneBurstPlayer {
    remaining: u32,
    interval: std::time::Duration,
    last: Option<std::time::Instant>,
    payload: Bytes,
}

impl ToneBurstPlayer {
    pub fn new(repeat: u32, interval: std::time::Duration, payload: Bytes) -> Self {
        Self {
            remaining: repeat,
            interval,
            last: None,
            payload,
        }
    }
}

impl Player for ToneBurstPlayer {
    fn poll(&mut self, now: std::time::Instant) -> PlayerPoll {
        if self.remaining == 0 {
            return PlayerPoll::Eof;
        }
        if let Some(last) = self.last {
            if now.duration_since(last) < self.interval {
                return PlayerPoll::Later;
            }
        }
        self.remaining -= 1;
        self.last = Some(now);
        PlayerPoll::Datagram(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_resizer_forwards_one_for_one() {
        let mut r = PassThroughResizer;
        let out = r.push(&Bytes::from_static(b"abc"));
        assert_eq!(out.len(), 1);
        assert_eq!(r.output_nsamples(), 0);
    }

    #[test]
    fn tone_burst_player_ends_after_repeat_count() {
        let mut p = ToneBurstPlayer::new(2, std::time::Duration::from_millis(0), Bytes::from_static(b"x"));
        let now = std::time::Instant::now();
        assert!(matches!(p.poll(now), PlayerPoll::Datagram(_)));
        assert!(matches!(p.poll(now), PlayerPoll::Datagram(_)));
        assert!(matches!(p.poll(now), PlayerPoll::Eof));
    }
}
