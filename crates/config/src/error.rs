use std::path::PathBuf;

/// Configuration errors. Every variant is fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required config field `{field}`")]
    MissingField { field: &'static str },

    #[error("`groupid` must be positive, got {value}")]
    NonPositiveGroupId { value: i64 },

    #[error("`ircbanre` must not be empty (use an always-false pattern such as `\\b\\B` to disable)")]
    EmptyBanPattern,

    #[error("`ircbanre` is not a valid pattern: {source}")]
    InvalidBanPattern {
        #[source]
        source: regex::Error,
    },

    #[error("failed to persist offset to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    #[must_use]
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

impl tgirc_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

tgirc_common::impl_context!();
