//! `PluginMeta` persistence: one mutable row per discovered plugin,
//! snapshot-backed like the settings store (`SPEC_FULL.md` §4.2).

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sf_domain::error::Result;
use sf_domain::model::{PluginMeta, PluginStatus};
use sf_domain::storage::JsonSnapshot;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    rows: Vec<PluginMeta>,
}

pub struct PluginMetaStore {
    rows: RwLock<HashMap<String, PluginMeta>>,
    snapshot: Option<JsonSnapshot>,
}

impl PluginMetaStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = JsonSnapshot::new(path.into());
        let loaded: Snapshot = snapshot.load()?;
        let mut rows = HashMap::new();
        for row in loaded.rows {
            rows.insert(row.name.clone(), row);
        }
        Ok(Self {
            rows: RwLock::new(rows),
            snapshot: Some(snapshot),
        })
    }

    fn persist(&self) {
        if let Some(snapshot) = &self.snapshot {
            let rows: Vec<PluginMeta> = self.rows.read().values().cloned().collect();
            if let Err(e) = snapshot.save(&Snapshot { rows }) {
                tracing::warn!(error = %e, "failed to persist plugin meta snapshot");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<PluginMeta> {
        self.rows.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<PluginMeta> {
        let mut out: Vec<_> = self.rows.read().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Load the existing row or create a fresh `new` one for a
    /// newly-discovered plugin.
    pub fn get_or_create(&self, name: &str, version: &str) -> PluginMeta {
        let mut rows = self.rows.write();
        let entry = rows
            .entry(name.to_string())
            .or_insert_with(|| PluginMeta::new(name, version))
            .clone();
        drop(rows);
        self.persist();
        entry
    }

    pub fn upsert(&self, meta: PluginMeta) {
        self.rows.write().insert(meta.name.clone(), meta);
        self.persist();
    }

    pub fn set_status(&self, name: &str, status: PluginStatus) {
        if let Some(row) = self.rows.write().get_mut(name) {
            row.status = status;
        }
        self.persist();
    }

    pub fn set_error(&self, name: &str, message: impl Into<String>) {
        if let Some(row) = self.rows.write().get_mut(name) {
            row.status = PluginStatus::Error;
            row.last_error = Some(message.into());
        }
        self.persist();
    }

    pub fn set_migration_head(&self, name: &str, stem: impl Into<String>) {
        if let Some(row) = self.rows.write().get_mut(name) {
            row.migration_head = Some(stem.into());
        }
        self.persist();
    }

    pub fn remove(&self, name: &str) {
        self.rows.write().remove(name);
        self.persist();
    }
}

impl Default for PluginMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_existing_row_unchanged() {
        let store = PluginMetaStore::new();
        let first = store.get_or_create("p", "1.0.0");
        assert_eq!(first.status, PluginStatus::New);
        store.set_status("p", PluginStatus::Active);
        let second = store.get_or_create("p", "1.0.0");
        assert_eq!(second.status, PluginStatus::Active);
    }

    #[test]
    fn set_error_marks_status_error_with_message() {
        let store = PluginMetaStore::new();
        store.get_or_create("p", "1.0.0");
        store.set_error("p", "boom");
        let row = store.get("p").unwrap();
        assert_eq!(row.status, PluginStatus::Error);
        assert_eq!(row.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.json");
        {
            let store = PluginMetaStore::open(&path).unwrap();
            store.get_or_create("p", "1.0.0");
            store.set_status("p", PluginStatus::Active);
        }
        let reopened = PluginMetaStore::open(&path).unwrap();
        assert_eq!(reopened.get("p").unwrap().status, PluginStatus::Active);
    }
}
