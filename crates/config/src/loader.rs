use std::path::Path;

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::RelayConfig,
    validate::unknown_keys,
};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Read, env-expand and parse the config file at `path`.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&raw, path)?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Parse config text. `path` is only used in error messages.
pub fn parse_config(raw: &str, path: &Path) -> Result<RelayConfig> {
    let raw = substitute_env(raw);
    let parse_err = |source| Error::Parse {
        path: path.to_path_buf(),
        source,
    };
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(parse_err)?;
    let unknown = unknown_keys(&value);
    let mut config: RelayConfig = serde_json::from_value(value).map_err(parse_err)?;
    config.unknown_keys = unknown;
    Ok(config)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"groupid": 5, "ircnick": "relay", "offset": 9}}"#).unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.groupid, 5);
        assert_eq!(cfg.ircnick, "relay");
        assert_eq!(cfg.offset, 9);
    }

    #[test]
    fn unknown_keys_are_kept_for_validation() {
        let cfg = parse_config(
            r#"{"groupid": 5, "ircnik": "typo", "ircnick": "relay"}"#,
            Path::new("config.json"),
        )
        .unwrap();
        assert_eq!(cfg.ircnick, "relay");
        assert_eq!(cfg.unknown_keys, vec!["ircnik"]);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/nonexistent/tgirc/config.json")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_config("{not json", Path::new("config.json")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("config.json"));
    }
}
