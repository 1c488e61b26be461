//! IRC side of the relay.
//!
//! One background task owns the socket: it registers, joins the configured
//! channel, answers and sends keepalive pings, surfaces channel messages as
//! [`tgirc_common::NormalizedMessage`]s, and is the only writer for outbound
//! lines. Any failure drops back to `Disconnected` and reconnects with capped
//! exponential backoff.

pub mod client;
pub mod config;
pub mod error;
pub mod lines;
pub mod proto;
pub mod state;
mod tls;

pub use {
    client::{IrcHandle, spawn},
    config::IrcSettings,
    error::{Error, Result},
    proto::{IrcEvent, ParseError, RawLine},
    state::ConnectionState,
};
