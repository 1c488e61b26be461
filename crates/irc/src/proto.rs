//! IRC line parsing.
//!
//! Raw lines are parsed into a [`RawLine`] (prefix, command, params) and then
//! classified into the small set of [`IrcEvent`]s the relay reacts to. IRCv3
//! message tags are accepted and ignored.

use std::fmt;

/// CTCP delimiter.
const CTCP: char = '\u{1}';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("missing command")]
    MissingCommand,

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Source of a message: `nick!user@host` or a server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    fn parse(raw: &str) -> Self {
        let (nick_user, host) = match raw.split_once('@') {
            Some((left, host)) => (left, Some(host.to_string())),
            None => (raw, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((nick, user)) => (nick, Some(user.to_string())),
            None => (nick_user, None),
        };
        Self {
            nick: nick.to_string(),
            user,
            host,
        }
    }
}

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub prefix: Option<Prefix>,
    /// Uppercased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl RawLine {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');
        if rest.is_empty() {
            return Err(ParseError::Empty);
        }

        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, after)) => after.trim_start_matches(' '),
                None => return Err(ParseError::MissingCommand),
            };
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw, after) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(Prefix::parse(raw));
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        if !command.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseError::InvalidCommand(command.to_string()));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, after) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_string());
            rest = after;
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    fn param(&self, index: usize) -> &str {
        self.params.get(index).map(String::as_str).unwrap_or("")
    }

    fn last_param(&self) -> &str {
        self.params.last().map(String::as_str).unwrap_or("")
    }

    fn source_nick(&self) -> &str {
        self.prefix.as_ref().map(|p| p.nick.as_str()).unwrap_or("")
    }
}

/// Events the connection task acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// `001`: registration accepted under `nick`.
    Welcome { nick: String },
    Ping { token: String },
    Pong,
    /// Channel or private message. `action` is set for CTCP ACTION.
    Privmsg {
        nick: String,
        target: String,
        text: String,
        action: bool,
    },
    Join { nick: String, channel: String },
    Kick {
        channel: String,
        nick: String,
        reason: String,
    },
    /// `366`: end of the NAMES list sent after a successful join.
    EndOfNames { channel: String },
    /// `433`: requested nick is taken.
    NickInUse,
    /// A numeric that ends registration or the join attempt.
    Rejected { code: u16, reason: String },
    /// Server `ERROR`, always followed by a close.
    ServerError { reason: String },
    Other,
}

impl IrcEvent {
    pub fn from_line(line: &RawLine) -> Self {
        match line.command.as_str() {
            "001" => Self::Welcome {
                nick: line.param(0).to_string(),
            },
            "PING" => Self::Ping {
                token: line.last_param().to_string(),
            },
            "PONG" => Self::Pong,
            "PRIVMSG" => privmsg(line),
            "JOIN" => Self::Join {
                nick: line.source_nick().to_string(),
                channel: line.param(0).to_string(),
            },
            "KICK" => Self::Kick {
                channel: line.param(0).to_string(),
                nick: line.param(1).to_string(),
                reason: line.param(2).to_string(),
            },
            "366" => Self::EndOfNames {
                channel: line.param(1).to_string(),
            },
            "433" => Self::NickInUse,
            "ERROR" => Self::ServerError {
                reason: line.last_param().to_string(),
            },
            cmd => match rejection_code(cmd) {
                Some(code) => Self::Rejected {
                    code,
                    reason: line.last_param().to_string(),
                },
                None => Self::Other,
            },
        }
    }
}

/// Numerics after which retrying the same registration or join is pointless
/// until the next reconnect.
fn rejection_code(command: &str) -> Option<u16> {
    let code: u16 = command.parse().ok()?;
    matches!(
        code,
        403 | 405 | 432 | 464 | 465 | 471 | 473 | 474 | 475 | 477
    )
    .then_some(code)
}

fn privmsg(line: &RawLine) -> IrcEvent {
    let nick = line.source_nick().to_string();
    let target = line.param(0).to_string();
    let body = line.param(1);

    match body.strip_prefix(CTCP) {
        Some(ctcp) => {
            let ctcp = ctcp.strip_suffix(CTCP).unwrap_or(ctcp);
            match ctcp.split_once(' ') {
                Some((verb, text)) if verb.eq_ignore_ascii_case("ACTION") => IrcEvent::Privmsg {
                    nick,
                    target,
                    text: text.to_string(),
                    action: true,
                },
                _ if ctcp.eq_ignore_ascii_case("ACTION") => IrcEvent::Privmsg {
                    nick,
                    target,
                    text: String::new(),
                    action: true,
                },
                // VERSION, PING and the rest of CTCP are not relayed.
                _ => IrcEvent::Other,
            }
        },
        None => IrcEvent::Privmsg {
            nick,
            target,
            text: body.to_string(),
            action: false,
        },
    }
}

/// Case-insensitive channel/nick comparison (RFC 1459 casemapping).
#[must_use]
pub fn irc_eq(a: &str, b: &str) -> bool {
    fn fold(c: char) -> char {
        match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        }
    }
    a.len() == b.len() && a.chars().map(fold).eq(b.chars().map(fold))
}

/// Client commands written by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Pass(&'a str),
    Nick(&'a str),
    User { user: &'a str, realname: &'a str },
    Join(&'a str),
    Ping(&'a str),
    Pong(&'a str),
    Privmsg { target: &'a str, text: &'a str },
    Quit(&'a str),
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass(pass) => write!(f, "PASS {pass}"),
            Self::Nick(nick) => write!(f, "NICK {nick}"),
            Self::User { user, realname } => write!(f, "USER {user} 0 * :{realname}"),
            Self::Join(channel) => write!(f, "JOIN {channel}"),
            Self::Ping(token) => write!(f, "PING :{token}"),
            Self::Pong(token) => write!(f, "PONG :{token}"),
            Self::Privmsg { target, text } => write!(f, "PRIVMSG {target} :{text}"),
            Self::Quit(reason) => write!(f, "QUIT :{reason}"),
        }
    }
}
