//! Startup validation.
//!
//! Hard errors abort startup with a [`crate::Error`]. Softer findings are
//! reported as [`Diagnostic`]s and logged by the caller: disabled
//! loop-prevention identities as warnings, unknown keys as info.

use {regex::Regex, secrecy::ExposeSecret};

use crate::{
    error::{Error, Result},
    schema::{RelayConfig, ServeMedia},
};

/// Keys understood by [`RelayConfig`].
const KNOWN_KEYS: &[&str] = &[
    "botid",
    "botname",
    "token",
    "groupid",
    "groupname",
    "i2t",
    "t2i",
    "ircbanre",
    "ircbotid",
    "ircbotname",
    "ircchannel",
    "ircnick",
    "ircserver",
    "ircport",
    "ircssl",
    "ircpass",
    "ircmaxlines",
    "offset",
    "shownick",
    "servemedia",
    "cachepath",
    "serveurl",
];

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A non-fatal validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Config key the finding refers to.
    pub key: String,
    pub message: String,
}

impl Diagnostic {
    fn warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            key: key.into(),
            message: message.into(),
        }
    }

    fn info(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            key: key.into(),
            message: message.into(),
        }
    }
}

/// A config that passed validation, with the ban filter compiled.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: RelayConfig,
    pub ban_filter: Regex,
    pub diagnostics: Vec<Diagnostic>,
}

/// Validate `config` before any network connection is attempted.
pub fn validate(config: RelayConfig) -> Result<ValidatedConfig> {
    if config.groupid <= 0 {
        return Err(Error::NonPositiveGroupId {
            value: config.groupid,
        });
    }
    if config.token.expose_secret().trim().is_empty() {
        return Err(Error::missing("token"));
    }
    for (field, value) in [
        ("ircserver", &config.ircserver),
        ("ircchannel", &config.ircchannel),
        ("ircnick", &config.ircnick),
    ] {
        if value.trim().is_empty() {
            return Err(Error::missing(field));
        }
    }
    match config.servemedia {
        ServeMedia::Off => {},
        ServeMedia::SelfHosted => {
            if config.cachepath.is_empty() {
                return Err(Error::missing("cachepath"));
            }
            if config.serveurl.is_empty() {
                return Err(Error::missing("serveurl"));
            }
        },
        ServeMedia::VimCn => {
            if config.cachepath.is_empty() {
                return Err(Error::missing("cachepath"));
            }
        },
    }

    let ban_filter = compile_ban_filter(&config.ircbanre)?;

    let mut diagnostics = Vec::new();
    if config.botid == 0 {
        diagnostics.push(Diagnostic::warning(
            "botid",
            "relay bot id is 0; its own messages will not be recognised",
        ));
    }
    if config.ircbotid == 0 {
        diagnostics.push(Diagnostic::warning(
            "ircbotid",
            "IRC forwarding bot id is 0; loop prevention for it is disabled",
        ));
    }
    if !config.ircchannel.starts_with(['#', '&', '+', '!']) {
        diagnostics.push(Diagnostic::warning(
            "ircchannel",
            format!("`{}` does not look like a channel name", config.ircchannel),
        ));
    }
    for key in &config.unknown_keys {
        diagnostics.push(Diagnostic::info(
            key.as_str(),
            format!("unknown config key `{key}` is ignored"),
        ));
    }

    Ok(ValidatedConfig {
        config,
        ban_filter,
        diagnostics,
    })
}

/// Compile the ban pattern, anchored at the start of the nick.
pub fn compile_ban_filter(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(Error::EmptyBanPattern);
    }
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| Error::InvalidBanPattern { source })
}

/// Top-level keys the schema does not know about, in file order.
pub(crate) fn unknown_keys(raw: &serde_json::Value) -> Vec<String> {
    let Some(map) = raw.as_object() else {
        return Vec::new();
    };
    map.keys()
        .filter(|k| !KNOWN_KEYS.contains(&k.as_str()))
        .cloned()
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, secrecy::Secret};

    fn valid() -> RelayConfig {
        RelayConfig {
            botid: 1,
            token: Secret::new("123:abc".into()),
            groupid: 1000,
            ircbanre: r"\b\B".into(),
            ircbotid: 2,
            ircchannel: "#chan".into(),
            ircnick: "relay".into(),
            ircserver: "irc.example.org".into(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_config() {
        let v = validate(valid()).unwrap();
        assert!(v.diagnostics.is_empty());
        assert!(!v.ban_filter.is_match("anyone"));
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(-100_123)]
    fn rejects_non_positive_group_id(#[case] groupid: i64) {
        let cfg = RelayConfig {
            groupid,
            ..valid()
        };
        assert!(matches!(
            validate(cfg),
            Err(Error::NonPositiveGroupId { value }) if value == groupid
        ));
    }

    #[test]
    fn rejects_empty_ban_pattern() {
        let cfg = RelayConfig {
            ircbanre: String::new(),
            ..valid()
        };
        assert!(matches!(validate(cfg), Err(Error::EmptyBanPattern)));
    }

    #[test]
    fn rejects_invalid_ban_pattern() {
        let cfg = RelayConfig {
            ircbanre: "(".into(),
            ..valid()
        };
        assert!(matches!(
            validate(cfg),
            Err(Error::InvalidBanPattern { .. })
        ));
    }

    #[test]
    fn self_hosting_needs_serveurl() {
        let cfg = RelayConfig {
            servemedia: ServeMedia::SelfHosted,
            cachepath: "/tmp".into(),
            ..valid()
        };
        assert!(matches!(
            validate(cfg),
            Err(Error::MissingField { field: "serveurl" })
        ));
    }

    #[test]
    fn missing_token() {
        let cfg = RelayConfig {
            token: Secret::new(String::new()),
            ..valid()
        };
        assert!(matches!(
            validate(cfg),
            Err(Error::MissingField { field: "token" })
        ));
    }

    #[test]
    fn ban_filter_is_anchored() {
        let re = compile_ban_filter("bot").unwrap();
        assert!(re.is_match("bot"));
        assert!(re.is_match("botnet"));
        assert!(!re.is_match("robot"));
    }

    #[test]
    fn zero_bot_ids_are_warned() {
        let cfg = RelayConfig {
            botid: 0,
            ircbotid: 0,
            ..valid()
        };
        let v = validate(cfg).unwrap();
        let keys: Vec<_> = v.diagnostics.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["botid", "ircbotid"]);
    }

    #[test]
    fn finds_unknown_keys() {
        let raw = serde_json::json!({"groupid": 1, "ircnik": "typo"});
        assert_eq!(unknown_keys(&raw), vec!["ircnik"]);
    }

    #[test]
    fn unknown_keys_become_info_diagnostics() {
        let cfg = RelayConfig {
            unknown_keys: vec!["ircnik".into()],
            ..valid()
        };
        let v = validate(cfg).unwrap();
        assert_eq!(v.diagnostics, vec![Diagnostic {
            severity: Severity::Info,
            key: "ircnik".into(),
            message: "unknown config key `ircnik` is ignored".into(),
        }]);
    }
}
