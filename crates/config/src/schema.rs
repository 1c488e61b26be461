//! On-disk configuration schema.
//!
//! Key names follow the relay's original flat `config.json` layout so
//! existing files keep working.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize},
};

/// How Telegram media is re-hosted for IRC readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServeMedia {
    /// Do not fetch media; IRC sees a `<photo>`-style tag.
    #[default]
    #[serde(rename = "")]
    Off,
    /// Store in `cachepath` and link under `serveurl`.
    #[serde(rename = "self")]
    SelfHosted,
    /// Upload to img.vim-cn.com.
    #[serde(rename = "vim-cn")]
    VimCn,
}

impl ServeMedia {
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

fn deserialize_serve_media<'de, D: Deserializer<'de>>(d: D) -> Result<ServeMedia, D::Error> {
    Ok(Option::<ServeMedia>::deserialize(d)?.unwrap_or_default())
}

/// Relay configuration as stored in `config.json`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Telegram user id of the relay bot itself.
    pub botid: u64,
    pub botname: String,
    /// Bot API token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// Positive form of the Telegram group id; the chat id is `-groupid`.
    pub groupid: i64,
    pub groupname: String,
    /// IRC → Telegram forwarding.
    pub i2t: bool,
    /// Telegram → IRC forwarding.
    pub t2i: bool,
    /// IRC nicks matching this pattern (anchored at the start) are ignored.
    pub ircbanre: String,
    /// Telegram user id that forwards IRC traffic into the group.
    pub ircbotid: u64,
    pub ircbotname: String,
    pub ircchannel: String,
    pub ircnick: String,
    pub ircserver: String,
    pub ircport: u16,
    pub ircssl: bool,
    #[serde(
        serialize_with = "serialize_optional_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub ircpass: Option<Secret<String>>,
    /// Maximum lines per relayed message on IRC; 0 means unlimited.
    pub ircmaxlines: usize,
    /// Last processed Telegram update cursor. Rewritten by the process.
    pub offset: i64,
    /// Prefix IRC text with `<nick>` on Telegram.
    pub shownick: bool,
    #[serde(deserialize_with = "deserialize_serve_media")]
    pub servemedia: ServeMedia,
    pub cachepath: String,
    pub serveurl: String,
    /// Top-level keys in the file that no field above reads.
    #[serde(skip)]
    pub unknown_keys: Vec<String>,
}

impl RelayConfig {
    /// Telegram chat id of the bridged group.
    #[must_use]
    pub fn group_chat_id(&self) -> i64 {
        -self.groupid
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            botid: 0,
            botname: String::new(),
            token: Secret::new(String::new()),
            groupid: 0,
            groupname: String::new(),
            i2t: true,
            t2i: true,
            ircbanre: String::new(),
            ircbotid: 0,
            ircbotname: String::new(),
            ircchannel: String::new(),
            ircnick: String::new(),
            ircserver: String::new(),
            ircport: 6667,
            ircssl: false,
            ircpass: None,
            ircmaxlines: 3,
            offset: 0,
            shownick: true,
            servemedia: ServeMedia::Off,
            cachepath: String::new(),
            serveurl: String::new(),
            unknown_keys: Vec::new(),
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("botid", &self.botid)
            .field("token", &"[REDACTED]")
            .field("groupid", &self.groupid)
            .field("ircserver", &self.ircserver)
            .field("ircport", &self.ircport)
            .field("ircssl", &self.ircssl)
            .field("ircchannel", &self.ircchannel)
            .field("ircnick", &self.ircnick)
            .field("servemedia", &self.servemedia)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_optional_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_str(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
