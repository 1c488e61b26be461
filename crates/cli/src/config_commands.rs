use std::path::Path;

use {
    anyhow::Result,
    tgirc_config::{Severity, ValidatedConfig},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// `tgirc check`: load and validate the config without connecting anywhere.
pub fn check(path: &Path, verbose: bool) -> Result<()> {
    eprintln!("Checking {}\n", path.display());

    let validated = match load(path) {
        Ok(validated) => validated,
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e:#}\n");
            eprintln!("1 error(s)");
            std::process::exit(1);
        },
    };

    let mut shown = 0;
    for d in &validated.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        let color = match d.severity {
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.key, d.message);
        shown += 1;
    }
    if shown > 0 {
        eprintln!();
    }

    let warnings = validated
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    if warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("0 error(s), {warnings} warning(s)");
    }
    Ok(())
}

/// Read, env-expand, parse and validate the config at `path`.
pub fn load(path: &Path) -> Result<ValidatedConfig> {
    let config = tgirc_config::load_config(path)?;
    Ok(tgirc_config::validate(config)?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    fn config_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{body}").unwrap();
        file
    }

    #[test]
    fn load_validates() {
        let file = config_file(
            r##"{
                "botid": 1, "token": "123:abc", "groupid": 1001,
                "ircbanre": "\\b\\B", "ircbotid": 2,
                "ircserver": "irc.example.org", "ircchannel": "#chan", "ircnick": "tgrelay"
            }"##,
        );
        let validated = load(file.path()).unwrap();
        assert_eq!(validated.config.group_chat_id(), -1001);
        assert!(validated.diagnostics.is_empty());
    }

    #[test]
    fn load_rejects_non_positive_group() {
        let file = config_file(
            r##"{
                "token": "123:abc", "groupid": -5, "ircbanre": "\\b\\B",
                "ircserver": "irc.example.org", "ircchannel": "#chan", "ircnick": "tgrelay"
            }"##,
        );
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("groupid"), "{err}");
    }
}
