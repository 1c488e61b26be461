//! Shared message types and error helpers used across the tgirc crates.

pub mod error;
pub mod types;

pub use {
    error::FromMessage,
    types::{
        MediaKind, MediaReference, MessageBuilder, NormalizedMessage, Origin, QuotedMessage,
        SenderId,
    },
};
