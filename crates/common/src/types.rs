//! The message shape both ingestion sides hand to the router.

use serde::{Deserialize, Serialize};

/// Which side of the bridge a message was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Telegram,
    Irc,
}

/// Platform identity of a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", content = "id", rename_all = "snake_case")]
pub enum SenderId {
    /// Numeric Telegram user id.
    Telegram(u64),
    /// IRC nickname.
    Irc(String),
}

impl SenderId {
    /// Telegram user id, if this is a Telegram sender.
    #[must_use]
    pub fn telegram_id(&self) -> Option<u64> {
        match self {
            Self::Telegram(id) => Some(*id),
            Self::Irc(_) => None,
        }
    }

    /// IRC nick, if this is an IRC sender.
    #[must_use]
    pub fn irc_nick(&self) -> Option<&str> {
        match self {
            Self::Irc(nick) => Some(nick),
            Self::Telegram(_) => None,
        }
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Telegram(id) => write!(f, "tg:{id}"),
            Self::Irc(nick) => write!(f, "irc:{nick}"),
        }
    }
}

/// Kind of attached media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Sticker,
    Document,
    Audio,
    Voice,
    Video,
    Animation,
    /// Non-file attachments (contact, location, poll, ...).
    Other(String),
}

impl MediaKind {
    /// Short label used in `<label>` tags on IRC.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Photo => "photo",
            Self::Sticker => "sticker",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Animation => "animation",
            Self::Other(label) => label,
        }
    }

    /// File extension to use when the remote path has none.
    #[must_use]
    pub fn fallback_extension(&self) -> &'static str {
        match self {
            Self::Photo => ".jpg",
            Self::Sticker => ".webp",
            Self::Voice => ".ogg",
            Self::Video | Self::Animation => ".mp4",
            Self::Audio => ".mp3",
            Self::Document | Self::Other(_) => "",
        }
    }
}

/// A pointer to a file hosted by the source platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub kind: MediaKind,
    /// Platform file id. Empty for attachments without a downloadable file.
    pub file_id: String,
    pub file_name: Option<String>,
    pub size: Option<u32>,
}

impl MediaReference {
    /// Whether the reference points at a downloadable file.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        !self.file_id.is_empty()
    }
}

/// A message quoted by a reply or a forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedMessage {
    pub sender: SenderId,
    pub sender_name: String,
    pub text: String,
}

/// A chat message normalized from either platform.
///
/// Built once by an ingestion component and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    origin: Origin,
    sender: SenderId,
    sender_name: String,
    text: String,
    media: Vec<MediaReference>,
    timestamp: i64,
    message_id: i64,
    reply_to: Option<QuotedMessage>,
    forwarded_from: Option<QuotedMessage>,
    is_action: bool,
}

impl NormalizedMessage {
    /// Start building a message read from Telegram.
    #[must_use]
    pub fn telegram(
        user_id: u64,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> MessageBuilder {
        MessageBuilder::new(Origin::Telegram, SenderId::Telegram(user_id), sender_name, text)
    }

    /// Start building a message read from IRC.
    #[must_use]
    pub fn irc(nick: impl Into<String>, text: impl Into<String>) -> MessageBuilder {
        let nick = nick.into();
        MessageBuilder::new(Origin::Irc, SenderId::Irc(nick.clone()), nick, text)
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn sender(&self) -> &SenderId {
        &self.sender
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn media(&self) -> &[MediaReference] {
        &self.media
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn message_id(&self) -> i64 {
        self.message_id
    }

    pub fn reply_to(&self) -> Option<&QuotedMessage> {
        self.reply_to.as_ref()
    }

    pub fn forwarded_from(&self) -> Option<&QuotedMessage> {
        self.forwarded_from.as_ref()
    }

    /// CTCP `ACTION` (`/me`) on IRC.
    pub fn is_action(&self) -> bool {
        self.is_action
    }
}

/// Builder for [`NormalizedMessage`]; consumed by [`MessageBuilder::build`].
#[derive(Debug)]
pub struct MessageBuilder {
    inner: NormalizedMessage,
}

impl MessageBuilder {
    fn new(
        origin: Origin,
        sender: SenderId,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            inner: NormalizedMessage {
                origin,
                sender,
                sender_name: sender_name.into(),
                text: text.into(),
                media: Vec::new(),
                timestamp: 0,
                message_id: 0,
                reply_to: None,
                forwarded_from: None,
                is_action: false,
            },
        }
    }

    #[must_use]
    pub fn media(mut self, media: MediaReference) -> Self {
        self.inner.media.push(media);
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.inner.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn message_id(mut self, message_id: i64) -> Self {
        self.inner.message_id = message_id;
        self
    }

    #[must_use]
    pub fn reply_to(mut self, quoted: QuotedMessage) -> Self {
        self.inner.reply_to = Some(quoted);
        self
    }

    #[must_use]
    pub fn forwarded_from(mut self, quoted: QuotedMessage) -> Self {
        self.inner.forwarded_from = Some(quoted);
        self
    }

    #[must_use]
    pub fn action(mut self, is_action: bool) -> Self {
        self.inner.is_action = is_action;
        self
    }

    #[must_use]
    pub fn build(self) -> NormalizedMessage {
        self.inner
    }
}
