//! The settings store: typed key/value config per plugin, with coercion,
//! cache invalidation, and a backend-refresh hook chain (`SPEC_FULL.md` §4.1).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sf_domain::error::{Error, Result};
use sf_domain::model::{PluginSetting, SettingType, SYSTEM_PLUGIN_NAME};
use sf_domain::storage::JsonSnapshot;

use crate::coerce::coerce;
use crate::defs::seed_system_settings;

type RefreshHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    rows: Vec<PluginSetting>,
}

/// Typed key/value settings store. `(plugin_name, key)` is the primary key;
/// `plugin_name = "__system__"` holds global settings (see
/// `sf_domain::model::SYSTEM_PLUGIN_NAME`).
pub struct SettingsStore {
    rows: RwLock<HashMap<(String, String), PluginSetting>>,
    /// Hooks fired after a successful write to a specific system-setting
    /// key (e.g. `STASH_URL` triggers external-client reconnection).
    hooks: RwLock<HashMap<String, Vec<RefreshHook>>>,
    snapshot: Option<JsonSnapshot>,
}

impl SettingsStore {
    /// A pure in-memory store seeded with the built-in system settings.
    pub fn new() -> Self {
        let store = Self {
            rows: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            snapshot: None,
        };
        store.seed();
        store
    }

    /// A store backed by a JSON snapshot file: loads existing state if
    /// present, else seeds defaults and writes the initial snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = JsonSnapshot::new(path.into());
        let loaded: Snapshot = snapshot.load()?;
        let store = Self {
            rows: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            snapshot: Some(snapshot),
        };
        if loaded.rows.is_empty() {
            store.seed();
            store.persist()?;
        } else {
            let mut rows = store.rows.write();
            for row in loaded.rows {
                rows.insert((row.plugin_name.clone(), row.key.clone()), row);
            }
        }
        Ok(store)
    }

    fn seed(&self) {
        let mut rows = self.rows.write();
        for row in seed_system_settings() {
            rows.insert((row.plugin_name.clone(), row.key.clone()), row);
        }
    }

    fn persist(&self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot {
            let rows: Vec<PluginSetting> = self.rows.read().values().cloned().collect();
            snapshot.save(&Snapshot { rows })?;
        }
        Ok(())
    }

    /// Register a callback fired (with the new effective value) whenever
    /// `__system__`'s `key` is successfully written.
    pub fn on_refresh(&self, key: impl Into<String>, hook: RefreshHook) {
        self.hooks.write().entry(key.into()).or_default().push(hook);
    }

    /// Read the effective value of a setting: override if present, else
    /// declared default. `NOT_FOUND` for an unknown `__system__` key;
    /// unknown plugin-scoped keys also surface `NOT_FOUND` (plugins are
    /// auto-created only on write, per spec).
    pub fn get(&self, plugin: &str, key: &str) -> Result<Value> {
        let rows = self.rows.read();
        rows.get(&(plugin.to_string(), key.to_string()))
            .map(|row| row.effective().clone())
            .ok_or_else(|| Error::NotFound(format!("setting {plugin}/{key}")))
    }

    pub fn get_number(&self, key: &str, default: f64) -> f64 {
        self.get(SYSTEM_PLUGIN_NAME, key)
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(SYSTEM_PLUGIN_NAME, key)
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(SYSTEM_PLUGIN_NAME, key)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    /// List every definition for a plugin (or all `__system__` rows).
    pub fn list(&self, plugin: &str) -> Vec<PluginSetting> {
        let mut out: Vec<_> = self
            .rows
            .read()
            .values()
            .filter(|r| r.plugin_name == plugin)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Write a setting. `value = Value::Null` clears the override (falls
    /// back to default on subsequent reads). Plugin-scoped keys that don't
    /// exist yet are auto-created with minimal metadata (`Json` typed,
    /// empty default) — system settings must already be seeded.
    pub fn set(&self, plugin: &str, key: &str, value: Value) -> Result<Value> {
        let pk = (plugin.to_string(), key.to_string());
        let coerced = {
            let mut rows = self.rows.write();
            let row = match rows.get_mut(&pk) {
                Some(row) => row,
                None => {
                    if plugin == SYSTEM_PLUGIN_NAME {
                        return Err(Error::NotFound(format!("setting {plugin}/{key}")));
                    }
                    rows.insert(
                        pk.clone(),
                        PluginSetting {
                            plugin_name: plugin.to_string(),
                            key: key.to_string(),
                            kind: SettingType::Json,
                            label: key.to_string(),
                            description: String::new(),
                            default: Value::Null,
                            options: Vec::new(),
                            value: None,
                        },
                    );
                    rows.get_mut(&pk).unwrap()
                }
            };

            if value.is_null() {
                row.value = None;
            } else {
                row.value = Some(coerce(row.kind, &value, &row.options)?);
            }
            row.effective().clone()
        };

        self.persist()?;

        if plugin == SYSTEM_PLUGIN_NAME {
            if let Some(hooks) = self.hooks.read().get(key) {
                for hook in hooks {
                    hook(key, &coerced);
                }
            }
        }

        Ok(coerced)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_returns_seeded_default() {
        let store = SettingsStore::new();
        assert_eq!(
            store.get(SYSTEM_PLUGIN_NAME, "TASK_LOOP_INTERVAL").unwrap(),
            json!(0.5)
        );
    }

    #[test]
    fn unknown_system_key_is_not_found() {
        let store = SettingsStore::new();
        assert!(matches!(
            store.get(SYSTEM_PLUGIN_NAME, "NOPE"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn set_then_get_round_trips_and_null_clears_override() {
        let store = SettingsStore::new();
        store.set(SYSTEM_PLUGIN_NAME, "TASK_DEBUG", json!(true)).unwrap();
        assert_eq!(store.get(SYSTEM_PLUGIN_NAME, "TASK_DEBUG").unwrap(), json!(true));
        store.set(SYSTEM_PLUGIN_NAME, "TASK_DEBUG", Value::Null).unwrap();
        assert_eq!(store.get(SYSTEM_PLUGIN_NAME, "TASK_DEBUG").unwrap(), json!(false));
    }

    #[test]
    fn set_rejects_invalid_coercion() {
        let store = SettingsStore::new();
        assert!(store
            .set(SYSTEM_PLUGIN_NAME, "TASK_DEBUG", json!("not-a-bool"))
            .is_err());
    }

    #[test]
    fn plugin_scoped_setting_is_auto_created_on_write() {
        let store = SettingsStore::new();
        store.set("stash-tagger", "THRESHOLD", json!(0.8)).unwrap();
        assert_eq!(store.get("stash-tagger", "THRESHOLD").unwrap(), json!(0.8));
        assert_eq!(store.list("stash-tagger").len(), 1);
    }

    #[test]
    fn refresh_hook_fires_on_matching_system_key_write() {
        let store = SettingsStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        store.on_refresh(
            "STASH_URL",
            Arc::new(move |_key, _value| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        store
            .set(SYSTEM_PLUGIN_NAME, "STASH_URL", json!("http://localhost:9999"))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Writing an unrelated key does not fire the hook.
        store.set(SYSTEM_PLUGIN_NAME, "TASK_DEBUG", json!(true)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        {
            let store = SettingsStore::open(&path).unwrap();
            store
                .set(SYSTEM_PLUGIN_NAME, "STASH_URL", json!("http://stash.local"))
                .unwrap();
        }
        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(SYSTEM_PLUGIN_NAME, "STASH_URL").unwrap(),
            json!("http://stash.local")
        );
    }
}
