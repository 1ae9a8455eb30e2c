use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The plugin name reserved for global, non-plugin-scoped settings.
pub const SYSTEM_PLUGIN_NAME: &str = "__system__";

/// The reserved, immutable plugin source name for on-disk manifests.
pub const LOCAL_SOURCE_NAME: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    String,
    Number,
    Boolean,
    Select,
    Json,
    PathMap,
}

/// A single (plugin_name, key) setting row. `value = None` means "use
/// `default`" — the coercion layer resolves this before handing the value
/// to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSetting {
    pub plugin_name: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: SettingType,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub default: Value,
    #[serde(default)]
    pub options: Vec<Value>,
    pub value: Option<Value>,
}

impl PluginSetting {
    /// The effective value: `value` if present, else `default`.
    pub fn effective(&self) -> &Value {
        self.value.as_ref().unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSource {
    pub name: String,
    pub index_url: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCatalogEntry {
    pub source: String,
    pub plugin_name: String,
    pub version: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub manifest: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn effective_falls_back_to_default_when_value_is_none() {
        let s = PluginSetting {
            plugin_name: SYSTEM_PLUGIN_NAME.into(),
            key: "TASK_LOOP_INTERVAL".into(),
            kind: SettingType::Number,
            label: "Task loop interval".into(),
            description: String::new(),
            default: json!(0.5),
            options: vec![],
            value: None,
        };
        assert_eq!(s.effective(), &json!(0.5));
    }
}
