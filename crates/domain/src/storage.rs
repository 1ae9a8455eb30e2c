//! Small, dependency-free persistence helpers shared by every store crate.
//!
//! This codebase has no RDBMS in scope (see `SPEC_FULL.md` §1 Non-goals): the
//! "relational with JSON columns" storage contract is satisfied with two
//! primitives used throughout the orchestrator crates:
//!
//! - [`JsonlLog`] — an append-only JSON-lines file, for naturally
//!   append-only tables (interaction events, task history, AI result rows).
//!   Mirrors the pattern already used for session transcripts.
//! - [`JsonSnapshot`] — a whole-file JSON snapshot, rewritten on every
//!   mutation, for small mutable tables (settings, plugin meta) where a
//!   replay log would be pure overhead.
//!
//! Both are optional: every store also works purely in-memory (no path
//! configured) so unit tests never touch the filesystem unless they choose
//! `tempfile::tempdir()` explicitly.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Append-only JSON-lines log.
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line. Creates the file (and its
    /// parent directory) if needed.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Load every record. Malformed lines are skipped with a warning
    /// rather than aborting the whole load — matching this codebase's
    /// existing transcript-reading convention.
    pub fn load_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut out = Vec::new();
        for (i, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(v) => out.push(v),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = i,
                        error = %e,
                        "skipping malformed jsonl record"
                    );
                }
            }
        }
        Ok(out)
    }
}

/// Whole-file JSON snapshot, rewritten on every `save`.
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&raw).map_err(Error::from)
    }

    /// Atomic-ish save: write to a sibling `.tmp` file then rename, so a
    /// crash mid-write never corrupts the previous snapshot.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let body = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: u32,
        name: String,
    }

    #[test]
    fn jsonl_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlLog::new(dir.path().join("rows.jsonl"));
        log.append(&Row { id: 1, name: "a".into() }).unwrap();
        log.append(&Row { id: 2, name: "b".into() }).unwrap();
        let rows: Vec<Row> = log.load_all().unwrap();
        assert_eq!(rows, vec![Row { id: 1, name: "a".into() }, Row { id: 2, name: "b".into() }]);
    }

    #[test]
    fn jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        std::fs::write(&path, "{\"id\":1,\"name\":\"a\"}\nnot json\n{\"id\":2,\"name\":\"b\"}\n")
            .unwrap();
        let log = JsonlLog::new(path);
        let rows: Vec<Row> = log.load_all().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn snapshot_round_trips_and_defaults_when_missing() {
        #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
        struct State {
            count: u32,
        }
        let dir = tempfile::tempdir().unwrap();
        let snap = JsonSnapshot::new(dir.path().join("state.json"));
        assert_eq!(snap.load::<State>().unwrap(), State::default());
        snap.save(&State { count: 7 }).unwrap();
        assert_eq!(snap.load::<State>().unwrap(), State { count: 7 });
    }
}
