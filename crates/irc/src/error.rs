use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("tls: {message}")]
    Tls { message: String },

    #[error("{phase} timed out after {after:?}")]
    Timeout {
        phase: &'static str,
        after: Duration,
    },

    #[error("server rejected us ({code}): {reason}")]
    Rejected { code: u16, reason: String },

    #[error("server error: {reason}")]
    ServerError { reason: String },

    #[error("kicked from {channel}: {reason}")]
    Kicked { channel: String, reason: String },

    #[error("no PONG within {0:?}")]
    KeepaliveTimeout(Duration),

    #[error("connection closed by server")]
    Closed,

    #[error("irc connection task has stopped")]
    TaskStopped,
}

impl Error {
    #[must_use]
    pub fn tls(message: impl std::fmt::Display) -> Self {
        Self::Tls {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn timeout(phase: &'static str, after: Duration) -> Self {
        Self::Timeout { phase, after }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
