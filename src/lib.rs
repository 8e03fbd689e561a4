//! A single-threaded RTP/RTCP media relay daemon, directed by an external
//! signalling controller over a line-oriented control protocol (`U`, `L`,
//! `D`, `P`, `S`, `R`, `V`, `I`).
//!
//! The event loop (`eventloop`) is the only thread: session state
//! (`session`), the forwarding pipeline (`forwarder`), the player scheduler
//! (`player_scheduler`) and the TTL reaper (`reaper`) all run cooperatively
//! between calls to `mio::Poll::poll`, so none of them need a mutex.

pub mod collaborators;
pub mod config;
pub mod control;
pub mod error;
pub mod eventloop;
pub mod forwarder;
pub mod net;
pub mod player_scheduler;
pub mod reaper;
pub mod session;
pub mod signals;
pub mod transport;
pub mod utils;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");