//! Built-in system setting definitions, seeded at startup.
//!
//! Mirrors the original `core/system_settings.py::_DEFS` table (see
//! `SPEC_FULL.md` §4.1). Each definition is seeded under the distinguished
//! `__system__` plugin and may be overridden on write or by an environment
//! variable of the same name at first-boot seed time.

use serde_json::{json, Value};
use sf_domain::model::{PluginSetting, SettingType, SYSTEM_PLUGIN_NAME};

/// A single built-in definition, prior to being materialized into a
/// [`PluginSetting`] row.
pub struct SystemSettingDef {
    pub key: &'static str,
    pub kind: SettingType,
    pub label: &'static str,
    pub description: &'static str,
    pub default: fn() -> Value,
    pub options: fn() -> Vec<Value>,
}

fn no_options() -> Vec<Value> {
    Vec::new()
}

/// The built-in system settings table. Order matches the original's
/// `_DEFS` declaration order.
pub const SYSTEM_SETTING_DEFS: &[SystemSettingDef] = &[
    SystemSettingDef {
        key: "STASH_URL",
        kind: SettingType::String,
        label: "Stash URL",
        description: "Base URL of the Stash GraphQL endpoint.",
        default: || json!(""),
        options: no_options,
    },
    SystemSettingDef {
        key: "STASH_API_KEY",
        kind: SettingType::String,
        label: "Stash API key",
        description: "API key used to authenticate against Stash.",
        default: || json!(""),
        options: no_options,
    },
    SystemSettingDef {
        key: "STASH_DB_PATH",
        kind: SettingType::String,
        label: "Stash database path",
        description: "Filesystem path to the Stash SQLite database (reflector access).",
        default: || json!(""),
        options: no_options,
    },
    SystemSettingDef {
        key: "PATH_MAPPINGS",
        kind: SettingType::PathMap,
        label: "Path mappings",
        description: "Rewrite rules applied to file paths returned by Stash.",
        default: || json!([]),
        options: no_options,
    },
    SystemSettingDef {
        key: "UI_SHARED_API_KEY",
        kind: SettingType::String,
        label: "Admin API key",
        description: "Shared secret gating the plugin/admin HTTP surface. Empty disables auth.",
        default: || json!(""),
        options: no_options,
    },
    SystemSettingDef {
        key: "INTERACTION_MIN_SESSION_MINUTES",
        kind: SettingType::Number,
        label: "Minimum session minutes",
        description: "Sessions shorter than this earn no derived \"o count\" credit on finalization.",
        default: || json!(10.0),
        options: no_options,
    },
    SystemSettingDef {
        key: "INTERACTION_MERGE_TTL_SECONDS",
        kind: SettingType::Number,
        label: "Session merge TTL (seconds)",
        description: "Window within which a new incoming session id merges into the prior one by fingerprint.",
        default: || json!(120.0),
        options: no_options,
    },
    SystemSettingDef {
        key: "SEGMENT_MERGE_GAP_SECONDS",
        kind: SettingType::Number,
        label: "Segment merge gap (seconds)",
        description: "Adjacent watch segments within this gap are merged into one.",
        default: || json!(0.5),
        options: no_options,
    },
    SystemSettingDef {
        key: "INTERACTION_SEGMENT_TIME_MARGIN_SECONDS",
        kind: SettingType::Number,
        label: "Segment recompute window margin (seconds)",
        description: "Margin added around a batch's timestamp range when recomputing segments.",
        default: || json!(2.0),
        options: no_options,
    },
    SystemSettingDef {
        key: "SEGMENT_MIN_DURATION_SECONDS",
        kind: SettingType::Number,
        label: "Minimum segment duration (seconds)",
        description: "Segments shorter than this are never persisted.",
        default: || json!(1.5),
        options: no_options,
    },
    SystemSettingDef {
        key: "TASK_LOOP_INTERVAL",
        kind: SettingType::Number,
        label: "Task runner loop interval (seconds)",
        description: "How often the task runner scans queues for dispatchable work. \
                       Advertised default mirrors the original UI-facing value; the task \
                       manager's own compiled-in fallback (used whenever the settings store \
                       is unreachable or not yet seeded) is 0.05s and lives in `TaskConfig`.",
        default: || json!(0.5),
        options: no_options,
    },
    SystemSettingDef {
        key: "TASK_DEBUG",
        kind: SettingType::Boolean,
        label: "Task manager debug logging",
        description: "Emit verbose per-dispatch trace events from the task runner.",
        default: || json!(false),
        options: no_options,
    },
];

/// Materialize the built-in defs into `__system__`-scoped rows with no
/// override (`value = None`), applying any matching environment variable
/// as the seed override.
pub fn seed_system_settings() -> Vec<PluginSetting> {
    SYSTEM_SETTING_DEFS
        .iter()
        .map(|def| {
            let value = std::env::var(def.key).ok().map(|raw| match def.kind {
                SettingType::Number => raw
                    .parse::<f64>()
                    .map(|n| json!(n))
                    .unwrap_or_else(|_| json!(raw)),
                SettingType::Boolean => json!(matches!(raw.to_lowercase().as_str(), "1" | "true")),
                _ => json!(raw),
            });
            PluginSetting {
                plugin_name: SYSTEM_PLUGIN_NAME.to_string(),
                key: def.key.to_string(),
                kind: def.kind,
                label: def.label.to_string(),
                description: def.description.to_string(),
                default: (def.default)(),
                options: (def.options)(),
                value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_one_row_per_def_under_system_plugin() {
        let rows = seed_system_settings();
        assert_eq!(rows.len(), SYSTEM_SETTING_DEFS.len());
        assert!(rows.iter().all(|r| r.plugin_name == SYSTEM_PLUGIN_NAME));
    }

    #[test]
    fn task_loop_interval_advertised_default_is_point_five() {
        let rows = seed_system_settings();
        let row = rows.iter().find(|r| r.key == "TASK_LOOP_INTERVAL").unwrap();
        assert_eq!(row.default, json!(0.5));
    }
}
