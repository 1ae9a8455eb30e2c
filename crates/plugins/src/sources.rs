//! Runtime plugin-source bookkeeping: enable/disable, last-refresh
//! metadata, and the immutable `local` row (`SPEC_FULL.md` §4.2, §6).
//!
//! Snapshot-backed like [`crate::store::PluginMetaStore`]; seeded at
//! startup from `PluginsConfig::sources` plus a synthesized `local` row
//! that can never be disabled or removed.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sf_domain::config::PluginSourceConfig;
use sf_domain::error::{Error, Result};
use sf_domain::model::{PluginSource, LOCAL_SOURCE_NAME};
use sf_domain::storage::JsonSnapshot;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    rows: Vec<PluginSource>,
}

pub struct PluginSourceStore {
    rows: RwLock<HashMap<String, PluginSource>>,
    snapshot: Option<JsonSnapshot>,
}

impl PluginSourceStore {
    fn from_rows(rows: HashMap<String, PluginSource>, snapshot: Option<JsonSnapshot>) -> Self {
        Self {
            rows: RwLock::new(rows),
            snapshot,
        }
    }

    /// Seed in-memory rows from config, always including the immutable
    /// `local` source, without touching disk.
    pub fn seed(configured: &[PluginSourceConfig]) -> Self {
        let rows = seeded_rows(configured);
        Self::from_rows(rows, None)
    }

    /// Like [`Self::seed`], but persists to `path` and loads any
    /// previously-saved enable/disable + refresh state over the seed.
    pub fn open(path: impl Into<PathBuf>, configured: &[PluginSourceConfig]) -> Result<Self> {
        let snapshot = JsonSnapshot::new(path.into());
        let loaded: Snapshot = snapshot.load()?;
        let mut rows = seeded_rows(configured);
        for row in loaded.rows {
            rows.insert(row.name.clone(), row);
        }
        let store = Self::from_rows(rows, Some(snapshot));
        store.persist();
        Ok(store)
    }

    fn persist(&self) {
        if let Some(snapshot) = &self.snapshot {
            let rows: Vec<PluginSource> = self.rows.read().values().cloned().collect();
            if let Err(e) = snapshot.save(&Snapshot { rows }) {
                tracing::warn!(error = %e, "failed to persist plugin source snapshot");
            }
        }
    }

    pub fn list(&self) -> Vec<PluginSource> {
        let mut out: Vec<_> = self.rows.read().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn get(&self, name: &str) -> Option<PluginSource> {
        self.rows.read().get(name).cloned()
    }

    /// Toggle a source's `enabled` flag. `SOURCE_IMMUTABLE` for `local`,
    /// `SOURCE_NOT_FOUND` for an unknown name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<PluginSource> {
        if name == LOCAL_SOURCE_NAME {
            return Err(Error::Conflict("SOURCE_IMMUTABLE".to_string()));
        }
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(name)
            .ok_or_else(|| Error::NotFound("SOURCE_NOT_FOUND".to_string()))?;
        row.enabled = enabled;
        let updated = row.clone();
        drop(rows);
        self.persist();
        Ok(updated)
    }

    pub fn mark_refreshed(&self, name: &str) {
        if let Some(row) = self.rows.write().get_mut(name) {
            row.last_refreshed_at = Some(Utc::now());
        }
        self.persist();
    }

    /// `SOURCE_NOT_FOUND` for unknown, `SOURCE_DISABLED` for a disabled
    /// remote source; `local` is always enabled.
    pub fn require_enabled(&self, name: &str) -> Result<PluginSource> {
        let row = self
            .get(name)
            .ok_or_else(|| Error::NotFound("SOURCE_NOT_FOUND".to_string()))?;
        if !row.enabled {
            return Err(Error::Conflict("SOURCE_DISABLED".to_string()));
        }
        Ok(row)
    }
}

fn seeded_rows(configured: &[PluginSourceConfig]) -> HashMap<String, PluginSource> {
    let mut rows = HashMap::new();
    rows.insert(
        LOCAL_SOURCE_NAME.to_string(),
        PluginSource {
            name: LOCAL_SOURCE_NAME.to_string(),
            index_url: String::new(),
            enabled: true,
            last_refreshed_at: None,
        },
    );
    for source in configured {
        rows.insert(
            source.name.clone(),
            PluginSource {
                name: source.name.clone(),
                index_url: source.index_url.clone(),
                enabled: source.enabled,
                last_refreshed_at: None,
            },
        );
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Vec<PluginSourceConfig> {
        vec![PluginSourceConfig {
            name: "remote".to_string(),
            index_url: "https://example.invalid".to_string(),
            enabled: true,
        }]
    }

    #[test]
    fn seeds_local_source_enabled_and_immutable() {
        let store = PluginSourceStore::seed(&[]);
        let local = store.get(LOCAL_SOURCE_NAME).unwrap();
        assert!(local.enabled);
        assert!(store.set_enabled(LOCAL_SOURCE_NAME, false).is_err());
    }

    #[test]
    fn disabling_unknown_source_is_not_found() {
        let store = PluginSourceStore::seed(&configured());
        let err = store.set_enabled("ghost", false).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn require_enabled_rejects_disabled_remote_source() {
        let store = PluginSourceStore::seed(&configured());
        store.set_enabled("remote", false).unwrap();
        let err = store.require_enabled("remote").unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn open_persists_enabled_flag_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        {
            let store = PluginSourceStore::open(&path, &configured()).unwrap();
            store.set_enabled("remote", false).unwrap();
        }
        let reopened = PluginSourceStore::open(&path, &configured()).unwrap();
        assert!(!reopened.get("remote").unwrap().enabled);
    }
}
