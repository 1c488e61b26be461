//! Telegram `Message` → [`NormalizedMessage`].

use {
    teloxide::types::{
        Chat, FileMeta, MediaKind as TgMedia, Message, MessageKind, MessageOrigin, User,
    },
    tgirc_common::{MediaKind, MediaReference, NormalizedMessage, QuotedMessage, SenderId},
};

/// Display names are cut to this many characters.
pub const MAX_NAME_CHARS: usize = 20;

/// Sender id used when a forward hides the original user.
pub const UNKNOWN_SENDER: u64 = 0;

/// Normalize a group message. Service messages and messages without a
/// sender return `None`.
#[must_use]
pub fn normalize(msg: &Message) -> Option<NormalizedMessage> {
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return None;
    }
    let from = msg.from.as_ref()?;

    let mut builder = NormalizedMessage::telegram(from.id.0, display_name(from), message_text(msg))
        .timestamp(msg.date.timestamp())
        .message_id(i64::from(msg.id.0));
    for media in media_references(msg) {
        builder = builder.media(media);
    }
    if let Some(quoted) = replied_message(msg) {
        builder = builder.reply_to(quoted);
    }
    if let Some(origin) = forward_source(msg) {
        builder = builder.forwarded_from(origin);
    }
    Some(builder.build())
}

/// `first last`, falling back to the username, cut to [`MAX_NAME_CHARS`].
#[must_use]
pub fn display_name(user: &User) -> String {
    let last = user.last_name.as_deref().unwrap_or("");
    let full = format!("{} {last}", user.first_name);
    let full = full.trim();
    let name = if full.is_empty() {
        user.username.as_deref().unwrap_or("")
    } else {
        full
    };
    truncate_name(name)
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_CHARS).collect()
}

fn chat_name(chat: &Chat) -> String {
    truncate_name(chat.title().or(chat.username()).unwrap_or(""))
}

/// Text or caption with non-breaking spaces flattened.
#[must_use]
pub fn message_text(msg: &Message) -> String {
    msg.text()
        .or_else(|| msg.caption())
        .map(|text| text.replace('\u{a0}', " "))
        .unwrap_or_default()
}

/// Attached media. Photos resolve to their largest size.
#[must_use]
pub fn media_references(msg: &Message) -> Vec<MediaReference> {
    let MessageKind::Common(common) = &msg.kind else {
        return Vec::new();
    };

    let reference = match &common.media_kind {
        TgMedia::Text(_) => return Vec::new(),
        TgMedia::Photo(p) => match p.photo.iter().max_by_key(|size| size.width) {
            Some(largest) => file_reference(MediaKind::Photo, &largest.file, None),
            None => return Vec::new(),
        },
        TgMedia::Sticker(s) => file_reference(MediaKind::Sticker, &s.sticker.file, None),
        TgMedia::Document(d) => file_reference(
            MediaKind::Document,
            &d.document.file,
            d.document.file_name.clone(),
        ),
        TgMedia::Audio(a) => {
            file_reference(MediaKind::Audio, &a.audio.file, a.audio.file_name.clone())
        },
        TgMedia::Voice(v) => file_reference(MediaKind::Voice, &v.voice.file, None),
        TgMedia::Video(v) => {
            file_reference(MediaKind::Video, &v.video.file, v.video.file_name.clone())
        },
        TgMedia::VideoNote(v) => file_reference(MediaKind::Video, &v.video_note.file, None),
        TgMedia::Animation(a) => file_reference(
            MediaKind::Animation,
            &a.animation.file,
            a.animation.file_name.clone(),
        ),
        other => MediaReference {
            kind: MediaKind::Other(attachment_label(other).to_string()),
            file_id: String::new(),
            file_name: None,
            size: None,
        },
    };
    vec![reference]
}

fn file_reference(kind: MediaKind, file: &FileMeta, file_name: Option<String>) -> MediaReference {
    MediaReference {
        kind,
        file_id: file.id.clone(),
        file_name,
        size: Some(file.size),
    }
}

fn attachment_label(media: &TgMedia) -> &'static str {
    match media {
        TgMedia::Contact(_) => "contact",
        TgMedia::Location(_) => "location",
        TgMedia::Venue(_) => "venue",
        TgMedia::Poll(_) => "poll",
        TgMedia::Game(_) => "game",
        _ => "media",
    }
}

fn replied_message(msg: &Message) -> Option<QuotedMessage> {
    let reply = msg.reply_to_message()?;
    let from = reply.from.as_ref()?;
    Some(QuotedMessage {
        sender: SenderId::Telegram(from.id.0),
        sender_name: display_name(from),
        text: message_text(reply),
    })
}

/// The original author of a forwarded message. The quoted text is the
/// forwarded text itself.
fn forward_source(msg: &Message) -> Option<QuotedMessage> {
    let (sender, sender_name) = match msg.forward_origin()? {
        MessageOrigin::User { sender_user, .. } => {
            (SenderId::Telegram(sender_user.id.0), display_name(sender_user))
        },
        MessageOrigin::HiddenUser {
            sender_user_name, ..
        } => (
            SenderId::Telegram(UNKNOWN_SENDER),
            truncate_name(sender_user_name),
        ),
        MessageOrigin::Chat { sender_chat, .. } => {
            (SenderId::Telegram(UNKNOWN_SENDER), chat_name(sender_chat))
        },
        MessageOrigin::Channel { chat, .. } => {
            (SenderId::Telegram(UNKNOWN_SENDER), chat_name(chat))
        },
    };
    Some(QuotedMessage {
        sender,
        sender_name,
        text: message_text(msg),
    })
}
