use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the adapter. Remote-call failures abort the
/// in-progress `step`/`reset` immediately; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid action code {0} (valid codes are 0..16)")]
    InvalidAction(usize),

    #[error("{call} timed out after {timeout:?}")]
    Timeout {
        call: &'static str,
        timeout: Duration,
    },

    #[error("{call} transport failure")]
    Transport {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("remote rejected {call}: {message}")]
    Remote {
        call: &'static str,
        message: String,
    },

    #[error("unexpected reply to {call}")]
    UnexpectedReply { call: &'static str },

    #[error("screen buffer has {len} pixels, expected {width}x{height}")]
    MalformedScreen { width: u32, height: u32, len: usize },
}
