//! Telegram update cursor, checkpointed into the config file.
//!
//! The loaded [`crate::RelayConfig`] stays immutable; the live cursor lives
//! here and only moves forward. A checkpoint rewrites the `offset` key of the
//! config file through a temp file + rename, leaving every other key intact.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::{Context, Error, Result};

/// Single-writer owner of the persisted Telegram cursor.
#[derive(Debug)]
pub struct OffsetStore {
    path: PathBuf,
    current: i64,
}

impl OffsetStore {
    /// Wrap the config file at `path`, whose `offset` was `initial` at load.
    pub fn open(path: impl Into<PathBuf>, initial: i64) -> Self {
        Self {
            path: path.into(),
            current: initial.max(0),
        }
    }

    /// Last persisted cursor.
    #[must_use]
    pub fn current(&self) -> i64 {
        self.current
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `cursor` if it is ahead of the stored value.
    ///
    /// Returns `true` when the file was rewritten. A cursor at or behind the
    /// current value is ignored, so the persisted offset never regresses.
    pub fn checkpoint(&mut self, cursor: i64) -> Result<bool> {
        if cursor <= self.current {
            return Ok(false);
        }
        write_offset(&self.path, cursor)?;
        debug!(path = %self.path.display(), from = self.current, to = cursor, "offset checkpointed");
        self.current = cursor;
        Ok(true)
    }
}

fn write_offset(path: &Path, cursor: i64) -> Result<()> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::persist(path, e))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&raw).context("config file is no longer valid JSON")?;
    let map = value
        .as_object_mut()
        .context("config file root is not a JSON object")?;
    map.insert("offset".into(), serde_json::Value::from(cursor));

    let rendered = serde_json::to_string_pretty(&value).context("serialize config")?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::persist(path, e))?;
    writeln!(tmp, "{rendered}").map_err(|e| Error::persist(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::persist(path, e))?;
    tmp.persist(path).map_err(|e| Error::persist(path, e.error))?;
    Ok(())
}
