//! Telegram side of the relay.
//!
//! Long-polls `getUpdates` for the configured group, normalizes messages for
//! the router, sends relayed text through a single-writer queue, and exposes
//! the Bot API file endpoints to the media relay.

pub mod bot;
pub mod error;
pub mod media;
pub mod normalize;
pub mod outbound;
pub mod poller;

#[cfg(test)]
pub(crate) mod mock_api;

pub use {
    bot::{BotIdentity, build_bot, connect, connect_with_retry},
    error::{Error, Result},
    media::TelegramFileSource,
    outbound::TelegramSender,
    poller::{PollBatch, PollerSettings, TelegramPoller},
};

pub use teloxide::{Bot, types::ChatId};
