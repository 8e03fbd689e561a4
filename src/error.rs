//! Error handling for the relay daemon

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Most of these never escape the event loop: the dispatcher and forwarder
/// convert them into an `ecode` or a log line (see `control::ecode`). Only
/// `Config` and `Io` errors encountered during startup are allowed to
/// propagate out of `main`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown verb: {0}")]
    UnknownVerb(char),

    #[error("session not found")]
    NotFound,

    #[error("allocation failure: {0}")]
    Allocation(String),

    #[error("listener exhausted: no free port pair in range")]
    ListenerExhausted,

    #[error("player construction failed: {0}")]
    PlayerConstruction(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn syntax<S: Into<String>>(msg: S) -> Self {
        Self::Syntax(msg.into())
    }

    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Self::Allocation(msg.into())
    }
}
