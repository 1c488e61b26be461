//! Outbound line shaping.
//!
//! IRC caps a full protocol line at 512 bytes including the CRLF and the
//! `:nick!user@host` prefix the server adds when relaying to other clients.
//! Payloads are sized against the worst case of that prefix.

use std::borrow::Cow;

/// Maximum protocol line length in bytes, CRLF included.
pub const MAX_LINE_BYTES: usize = 512;

/// Longest user and host parts reserved for the relayed prefix.
const USER_RESERVE: usize = 10;
const HOST_RESERVE: usize = 63;

const ELLIPSIS: char = '…';

/// Byte budget for the text of `PRIVMSG <channel> :<text>` sent as `nick`.
#[must_use]
pub fn privmsg_budget(nick: &str, channel: &str) -> usize {
    // ":" nick "!" user "@" host " "
    let prefix = 1 + nick.len() + 1 + USER_RESERVE + 1 + HOST_RESERVE + 1;
    let command = "PRIVMSG ".len() + channel.len() + " :".len();
    MAX_LINE_BYTES.saturating_sub(2 + prefix + command)
}

/// Strip characters that would break line framing.
#[must_use]
pub fn sanitize(line: &str) -> Cow<'_, str> {
    if line.contains(['\r', '\n', '\0']) {
        Cow::Owned(line.replace(['\r', '\n', '\0'], " "))
    } else {
        Cow::Borrowed(line)
    }
}

/// Cut `text` to at most `budget` bytes at a char boundary, marking the cut
/// with `…`.
#[must_use]
pub fn truncate_to(text: &str, budget: usize) -> Cow<'_, str> {
    if text.len() <= budget {
        return Cow::Borrowed(text);
    }
    let room = budget.saturating_sub(ELLIPSIS.len_utf8());
    let mut end = room.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + ELLIPSIS.len_utf8());
    out.push_str(&text[..end]);
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Payloads for one logical message: sanitized and trimmed to `budget`,
/// empty lines dropped.
#[must_use]
pub fn fit_lines(lines: &[String], budget: usize) -> Vec<String> {
    lines
        .iter()
        .map(|line| sanitize(line))
        .filter(|line| !line.trim().is_empty())
        .map(|line| truncate_to(&line, budget).into_owned())
        .collect()
}
