//! The relay core: routing policy plus the task wiring that connects the
//! Telegram poller, the IRC client, and the media relay.

pub mod bridge;
pub mod error;
pub mod router;

pub use {
    bridge::{Bridge, irc_settings},
    error::{Error, Result},
    router::{IrcDraft, IrcSend, RelayIdentity, RoutePolicy, Router, TelegramSend},
};
