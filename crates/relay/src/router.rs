//! Routing policy for both directions.
//!
//! The router is pure: it decides whether a message crosses the bridge and
//! how it is rendered on the other side, and holds no mutable state. Media
//! re-hosting happens between [`Router::route_telegram`] and
//! [`IrcDraft::finish`] so that the network call stays outside this module.

use {
    regex::Regex,
    tgirc_common::{MediaReference, NormalizedMessage, QuotedMessage, SenderId},
    tgirc_irc::proto::irc_eq,
    tracing::debug,
};

/// Texts starting with this marker are never sent to IRC.
pub const OPT_OUT_PREFIX: &str = "@@@";

/// Suffix marking that a multi-line message was cut.
const CUT_MARKER: &str = " [...]";

/// The relay's own accounts, used to break echo loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayIdentity {
    /// The bot this process polls with.
    pub telegram_bot_id: u64,
    /// Telegram account that posts IRC traffic into the group. `0` if unset.
    pub irc_bot_id: u64,
    /// Nick this process uses on IRC.
    pub irc_nick: String,
}

impl RelayIdentity {
    fn is_relay_account(&self, id: u64) -> bool {
        id != 0 && (id == self.telegram_bot_id || id == self.irc_bot_id)
    }

    fn is_relay_sender(&self, sender: &SenderId) -> bool {
        sender
            .telegram_id()
            .is_some_and(|id| self.is_relay_account(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Forward IRC to Telegram.
    pub i2t: bool,
    /// Forward Telegram to IRC.
    pub t2i: bool,
    /// Prefix Telegram text with the IRC nick.
    pub show_nick: bool,
    /// Lines per message sent to IRC; `0` is unlimited.
    pub max_lines: usize,
    /// Media is re-hosted; otherwise a `<kind>` tag stands in for it.
    pub rehost_media: bool,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            i2t: true,
            t2i: true,
            show_nick: true,
            max_lines: 3,
            rehost_media: false,
        }
    }
}

/// Text to post into the Telegram group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSend {
    pub text: String,
}

/// Lines to post into the IRC channel as one logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcSend {
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Attachment {
    None,
    /// Re-host this file and append its URL.
    Rehost(MediaReference),
    /// Append `<label>`.
    Tag(String),
}

/// A Telegram message accepted for IRC, waiting for its media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcDraft {
    sender_name: String,
    text: String,
    attachment: Attachment,
    context: Option<Context>,
    max_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    /// `name: text`
    Reply { name: String },
    /// `Fwd name: text`
    Forward { name: String },
}

impl IrcDraft {
    /// The file to re-host, if any.
    #[must_use]
    pub fn media(&self) -> Option<&MediaReference> {
        match &self.attachment {
            Attachment::Rehost(media) => Some(media),
            Attachment::None | Attachment::Tag(_) => None,
        }
    }

    /// Render the draft. `url` is the re-hosted media URL, `None` when there
    /// was nothing to re-host or re-hosting failed. Returns `None` when no
    /// text is left to send.
    #[must_use]
    pub fn finish(self, url: Option<&str>) -> Option<IrcSend> {
        let suffix = match (&self.attachment, url) {
            (Attachment::Rehost(_), Some(url)) => Some(url.to_string()),
            (Attachment::Tag(label), _) => Some(format!("<{label}>")),
            _ => None,
        };

        let mut text = self.text;
        if let Some(suffix) = suffix {
            if text.trim().is_empty() {
                text = suffix;
            } else {
                text.push(' ');
                text.push_str(&suffix);
            }
        }
        if text.trim().is_empty() {
            return None;
        }

        let text = match self.context {
            Some(Context::Reply { name }) => format!("{name}: {text}"),
            Some(Context::Forward { name }) => format!("Fwd {name}: {text}"),
            None => text,
        };

        let lines = limit_lines(&text, self.max_lines)
            .into_iter()
            .map(|line| format!("<{}> {line}", self.sender_name))
            .collect();
        Some(IrcSend { lines })
    }
}

/// Non-blank lines of `text`, at most `max_lines` (`0` = all). The last kept
/// line is marked when lines were dropped.
fn limit_lines(text: &str, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();
    if max_lines > 0 && lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            last.push_str(CUT_MARKER);
        }
    }
    lines
}

/// Split a message the relay itself posted into `(nick, text)`.
///
/// Recognizes `<nick> text`, `** nick text **` and the older `[nick] text`.
#[must_use]
pub fn split_relayed(text: &str) -> Option<(&str, &str)> {
    let valid = |nick: &str| !nick.is_empty() && !nick.contains(char::is_whitespace);

    if let Some(rest) = text.strip_prefix('<')
        && let Some((nick, body)) = rest.split_once("> ")
        && valid(nick)
    {
        return Some((nick, body));
    }
    if let Some(rest) = text.strip_prefix('[')
        && let Some((nick, body)) = rest.split_once("] ")
        && valid(nick)
    {
        return Some((nick, body));
    }
    if let Some(inner) = text
        .strip_prefix("** ")
        .and_then(|rest| rest.strip_suffix(" **"))
        && let Some((nick, body)) = inner.split_once(' ')
        && valid(nick)
    {
        return Some((nick, body));
    }
    None
}

/// Applies the routing policy to messages from either side.
#[derive(Debug, Clone)]
pub struct Router {
    identity: RelayIdentity,
    policy: RoutePolicy,
    ban_filter: Regex,
}

impl Router {
    /// `ban_filter` is matched against IRC nicks and should be anchored at
    /// the start.
    pub fn new(identity: RelayIdentity, policy: RoutePolicy, ban_filter: Regex) -> Self {
        Self {
            identity,
            policy,
            ban_filter,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &RelayIdentity {
        &self.identity
    }

    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// IRC → Telegram.
    #[must_use]
    pub fn route_irc(&self, msg: &NormalizedMessage) -> Option<TelegramSend> {
        if !self.policy.i2t {
            return None;
        }
        let nick = msg.sender().irc_nick()?;

        if irc_eq(nick, &self.identity.irc_nick) {
            debug!(nick, "dropping our own irc message");
            return None;
        }
        if self.ban_filter.is_match(nick) {
            debug!(nick, "dropping message from banned irc nick");
            return None;
        }

        let body = msg.text().trim();
        if body.is_empty() {
            return None;
        }

        let text = match (self.policy.show_nick, msg.is_action()) {
            (true, true) => format!("** {nick} {body} **"),
            (true, false) => format!("<{nick}> {body}"),
            (false, _) => body.to_string(),
        };
        Some(TelegramSend { text })
    }

    /// Telegram → IRC. The caller re-hosts [`IrcDraft::media`] and then
    /// calls [`IrcDraft::finish`].
    #[must_use]
    pub fn route_telegram(&self, msg: &NormalizedMessage) -> Option<IrcDraft> {
        if !self.policy.t2i {
            return None;
        }
        if self.identity.is_relay_sender(msg.sender()) {
            debug!(sender = %msg.sender(), "dropping message from a relay account");
            return None;
        }
        if msg.text().starts_with(OPT_OUT_PREFIX) {
            debug!(sender = %msg.sender(), "message opted out of irc relay");
            return None;
        }

        let attachment = match msg.media().first() {
            None => Attachment::None,
            Some(media) if self.policy.rehost_media && media.is_downloadable() => {
                Attachment::Rehost(media.clone())
            },
            Some(media) => Attachment::Tag(media.kind.label().to_string()),
        };
        if msg.text().trim().is_empty() && attachment == Attachment::None {
            return None;
        }

        let mut text = msg.text().to_string();
        let context = if let Some(origin) = msg.forwarded_from() {
            let name = match self.relayed_nick(origin) {
                Some((nick, body)) => {
                    text = body.to_string();
                    nick.to_string()
                },
                None => origin.sender_name.clone(),
            };
            Some(Context::Forward { name })
        } else {
            msg.reply_to().map(|quoted| Context::Reply {
                name: self
                    .relayed_nick(quoted)
                    .map(|(nick, _)| nick.to_string())
                    .unwrap_or_else(|| quoted.sender_name.clone()),
            })
        };

        Some(IrcDraft {
            sender_name: msg.sender_name().to_string(),
            text,
            attachment,
            context,
            max_lines: self.policy.max_lines,
        })
    }

    /// The IRC nick behind a quoted message the relay posted itself.
    fn relayed_nick<'a>(&self, quoted: &'a QuotedMessage) -> Option<(&'a str, &'a str)> {
        if !self.identity.is_relay_sender(&quoted.sender) {
            return None;
        }
        split_relayed(&quoted.text)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        tgirc_common::MediaKind,
    };

    const TG_BOT: u64 = 777;
    const IRC_BOT: u64 = 888;

    fn identity() -> RelayIdentity {
        RelayIdentity {
            telegram_bot_id: TG_BOT,
            irc_bot_id: IRC_BOT,
            irc_nick: "tgrelay".into(),
        }
    }

    fn ban(pattern: &str) -> Regex {
        Regex::new(&format!("^(?:{pattern})")).unwrap()
    }

    fn router(policy: RoutePolicy) -> Router {
        Router::new(identity(), policy, ban(r"\b\B"))
    }

    fn irc(nick: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage::irc(nick, text).build()
    }

    fn tg(user_id: u64, name: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage::telegram(user_id, name, text).build()
    }

    fn photo() -> MediaReference {
        MediaReference {
            kind: MediaKind::Photo,
            file_id: "photo-id".into(),
            file_name: None,
            size: Some(10),
        }
    }

    fn lines(send: Option<IrcSend>) -> Vec<String> {
        send.expect("message routed").lines
    }

    // IRC -> Telegram

    #[test]
    fn irc_message_gets_nick_prefix() {
        let out = router(RoutePolicy::default()).route_irc(&irc("alice", "hello"));
        assert_eq!(out, Some(TelegramSend {
            text: "<alice> hello".into()
        }));
    }

    #[test]
    fn show_nick_off_sends_raw_text() {
        let r = router(RoutePolicy {
            show_nick: false,
            ..RoutePolicy::default()
        });
        assert_eq!(r.route_irc(&irc("alice", "hello")).unwrap().text, "hello");
        let action = NormalizedMessage::irc("alice", "waves").action(true).build();
        assert_eq!(r.route_irc(&action).unwrap().text, "waves");
    }

    #[test]
    fn action_is_starred() {
        let action = NormalizedMessage::irc("alice", "waves").action(true).build();
        let out = router(RoutePolicy::default()).route_irc(&action).unwrap();
        assert_eq!(out.text, "** alice waves **");
    }

    #[rstest]
    #[case("tgrelay")]
    #[case("TGRelay")]
    fn own_irc_nick_never_reaches_telegram(#[case] nick: &str) {
        assert!(router(RoutePolicy::default()).route_irc(&irc(nick, "echo")).is_none());
    }

    #[rstest]
    #[case("spambot", true)]
    #[case("spambot42", true)]
    #[case("alice", false)]
    #[case("my_spambot", false)]
    fn ban_pattern_is_anchored_at_start(#[case] nick: &str, #[case] dropped: bool) {
        let r = Router::new(identity(), RoutePolicy::default(), ban("spambot"));
        assert_eq!(r.route_irc(&irc(nick, "buy now")).is_none(), dropped);
    }

    #[test]
    fn never_matching_pattern_drops_nothing() {
        let r = router(RoutePolicy::default());
        for nick in ["a", "spambot", "tgrelay_", "Z"] {
            assert!(r.route_irc(&irc(nick, "x")).is_some(), "{nick}");
        }
    }

    #[test]
    fn i2t_disabled_drops_everything() {
        let r = router(RoutePolicy {
            i2t: false,
            ..RoutePolicy::default()
        });
        assert!(r.route_irc(&irc("alice", "hello")).is_none());
    }

    #[test]
    fn blank_irc_text_is_dropped() {
        assert!(router(RoutePolicy::default()).route_irc(&irc("alice", "   ")).is_none());
    }

    #[test]
    fn telegram_messages_are_not_routed_to_telegram() {
        assert!(router(RoutePolicy::default()).route_irc(&tg(1, "Bob", "hi")).is_none());
    }

    // Telegram -> IRC

    #[test]
    fn telegram_message_lines_carry_sender_name() {
        let draft = router(RoutePolicy::default())
            .route_telegram(&tg(1, "Bob", "hi there"))
            .unwrap();
        assert!(draft.media().is_none());
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> hi there"]);
    }

    #[rstest]
    #[case(IRC_BOT)]
    #[case(TG_BOT)]
    fn relay_accounts_never_reach_irc(#[case] sender: u64) {
        let r = router(RoutePolicy::default());
        assert!(r.route_telegram(&tg(sender, "Relay", "<alice> hi")).is_none());
    }

    #[test]
    fn unset_irc_bot_id_does_not_match_everyone() {
        let r = Router::new(
            RelayIdentity {
                irc_bot_id: 0,
                ..identity()
            },
            RoutePolicy::default(),
            ban(r"\b\B"),
        );
        assert!(r.route_telegram(&tg(5, "Bob", "hi")).is_some());
    }

    #[test]
    fn opt_out_marker_is_respected() {
        let r = router(RoutePolicy::default());
        assert!(r.route_telegram(&tg(1, "Bob", "@@@ private")).is_none());
    }

    #[test]
    fn t2i_disabled_drops_everything() {
        let r = router(RoutePolicy {
            t2i: false,
            ..RoutePolicy::default()
        });
        assert!(r.route_telegram(&tg(1, "Bob", "hi")).is_none());
    }

    #[test]
    fn long_messages_are_cut_to_max_lines() {
        let r = router(RoutePolicy::default());
        let draft = r
            .route_telegram(&tg(1, "Bob", "one\n\ntwo\n   \nthree\nfour\nfive"))
            .unwrap();
        assert_eq!(lines(draft.finish(None)), vec![
            "<Bob> one",
            "<Bob> two",
            "<Bob> three [...]",
        ]);
    }

    #[test]
    fn zero_max_lines_is_unlimited() {
        let r = router(RoutePolicy {
            max_lines: 0,
            ..RoutePolicy::default()
        });
        let draft = r.route_telegram(&tg(1, "Bob", "1\n2\n3\n4\n5")).unwrap();
        assert_eq!(lines(draft.finish(None)).len(), 5);
    }

    #[test]
    fn photo_url_is_appended_when_rehosted() {
        let r = router(RoutePolicy {
            rehost_media: true,
            ..RoutePolicy::default()
        });
        let msg = NormalizedMessage::telegram(1, "Bob", "look").media(photo()).build();
        let draft = r.route_telegram(&msg).unwrap();
        assert_eq!(draft.media(), Some(&photo()));
        assert_eq!(
            lines(draft.finish(Some("http://m.example/abc.jpg"))),
            vec!["<Bob> look http://m.example/abc.jpg"]
        );
    }

    #[test]
    fn failed_rehost_forwards_text_only() {
        let r = router(RoutePolicy {
            rehost_media: true,
            ..RoutePolicy::default()
        });
        let msg = NormalizedMessage::telegram(1, "Bob", "look").media(photo()).build();
        assert_eq!(lines(r.route_telegram(&msg).unwrap().finish(None)), vec!["<Bob> look"]);

        // Nothing at all is left for a captionless photo.
        let bare = NormalizedMessage::telegram(1, "Bob", "").media(photo()).build();
        assert!(r.route_telegram(&bare).unwrap().finish(None).is_none());
    }

    #[test]
    fn media_is_tagged_when_rehosting_is_off() {
        let r = router(RoutePolicy::default());
        let bare = NormalizedMessage::telegram(1, "Bob", "").media(photo()).build();
        let draft = r.route_telegram(&bare).unwrap();
        assert!(draft.media().is_none());
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> <photo>"]);
    }

    #[test]
    fn non_downloadable_media_is_tagged_even_when_rehosting() {
        let r = router(RoutePolicy {
            rehost_media: true,
            ..RoutePolicy::default()
        });
        let location = MediaReference {
            kind: MediaKind::Other("location".into()),
            file_id: String::new(),
            file_name: None,
            size: None,
        };
        let msg = NormalizedMessage::telegram(1, "Bob", "here").media(location).build();
        let draft = r.route_telegram(&msg).unwrap();
        assert!(draft.media().is_none());
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> here <location>"]);
    }

    #[test]
    fn empty_message_without_media_is_dropped() {
        assert!(router(RoutePolicy::default()).route_telegram(&tg(1, "Bob", "  ")).is_none());
    }

    #[test]
    fn reply_to_user_uses_their_name() {
        let msg = NormalizedMessage::telegram(1, "Bob", "agreed")
            .reply_to(QuotedMessage {
                sender: SenderId::Telegram(2),
                sender_name: "Carol".into(),
                text: "lunch?".into(),
            })
            .build();
        let draft = router(RoutePolicy::default()).route_telegram(&msg).unwrap();
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> Carol: agreed"]);
    }

    #[rstest]
    #[case(TG_BOT, "<alice> lunch?")]
    #[case(IRC_BOT, "<alice> lunch?")]
    #[case(TG_BOT, "** alice waves **")]
    #[case(IRC_BOT, "[alice] legacy format")]
    fn reply_to_relayed_message_recovers_irc_nick(#[case] bot: u64, #[case] quoted: &str) {
        let msg = NormalizedMessage::telegram(1, "Bob", "agreed")
            .reply_to(QuotedMessage {
                sender: SenderId::Telegram(bot),
                sender_name: "Relay".into(),
                text: quoted.into(),
            })
            .build();
        let draft = router(RoutePolicy::default()).route_telegram(&msg).unwrap();
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> alice: agreed"]);
    }

    #[test]
    fn forward_from_user() {
        let msg = NormalizedMessage::telegram(1, "Bob", "big news")
            .forwarded_from(QuotedMessage {
                sender: SenderId::Telegram(3),
                sender_name: "Dave".into(),
                text: "big news".into(),
            })
            .build();
        let draft = router(RoutePolicy::default()).route_telegram(&msg).unwrap();
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> Fwd Dave: big news"]);
    }

    #[test]
    fn forward_of_relayed_message_unwraps_nick_and_text() {
        let msg = NormalizedMessage::telegram(1, "Bob", "<alice> from irc")
            .forwarded_from(QuotedMessage {
                sender: SenderId::Telegram(TG_BOT),
                sender_name: "Relay".into(),
                text: "<alice> from irc".into(),
            })
            .build();
        let draft = router(RoutePolicy::default()).route_telegram(&msg).unwrap();
        assert_eq!(lines(draft.finish(None)), vec!["<Bob> Fwd alice: from irc"]);
    }

    #[rstest]
    #[case("<alice> hi", Some(("alice", "hi")))]
    #[case("** bob waves hello **", Some(("bob", "waves hello")))]
    #[case("[carol] old style", Some(("carol", "old style")))]
    #[case("<a b> nope", None)]
    #[case("<> empty", None)]
    #[case("plain text", None)]
    fn relayed_text_parsing(#[case] text: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(split_relayed(text), expected);
    }
}
