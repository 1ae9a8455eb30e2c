//! Plugin manifest (`plugin.yml`) parsing (`SPEC_FULL.md` §4.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    /// Version constraint against the running backend (`SPEC_FULL.md` §4.2).
    /// Mandatory: a manifest without one is rejected, matching the original
    /// loader's `if not (name and ver and req): return None`.
    pub required_backend: String,
    #[serde(default)]
    pub files: Vec<String>,
    /// Raw, as-parsed dependency tokens before tolerant-null filtering —
    /// use [`PluginManifest::dependencies`] for the cleaned list.
    #[serde(default, rename = "depends_on")]
    raw_depends_on: Vec<Option<String>>,
    #[serde(default)]
    pub human_name: Option<String>,
    #[serde(default)]
    pub server_link: Option<String>,
    #[serde(default)]
    pub pip_dependencies: Vec<String>,
    /// `settings` | `ui_settings` | `config` — whichever key the manifest
    /// uses, kept as an opaque blob for the settings-schema registration
    /// step; shape is plugin-defined.
    #[serde(default, alias = "ui_settings", alias = "config")]
    pub settings: Value,
}

impl PluginManifest {
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Declared dependency plugin names with null/"none"/empty-string
    /// tokens dropped (tolerant parsing, `SPEC_FULL.md` §9 Open Question 4).
    pub fn dependencies(&self) -> Vec<String> {
        self.raw_depends_on
            .iter()
            .filter_map(|tok| match tok {
                None => None,
                Some(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = r#"
name: stash-tagger
version: 1.2.0
required_backend: ">=0.1.0"
files: [main.py]
depends_on: [stash-core]
"#;
        let m = PluginManifest::parse(yaml).unwrap();
        assert_eq!(m.name, "stash-tagger");
        assert_eq!(m.version, "1.2.0");
        assert_eq!(m.dependencies(), vec!["stash-core"]);
    }

    #[test]
    fn tolerant_depends_on_drops_null_none_and_empty_tokens() {
        let yaml = r#"
name: p
version: "1.0"
required_backend: ">=0.1.0"
depends_on: [real-dep, ~, "none", "", "None"]
"#;
        let m = PluginManifest::parse(yaml).unwrap();
        assert_eq!(m.dependencies(), vec!["real-dep"]);
    }

    #[test]
    fn missing_depends_on_is_empty() {
        let yaml = "name: p\nversion: \"1.0\"\nrequired_backend: \">=0.1.0\"\n";
        let m = PluginManifest::parse(yaml).unwrap();
        assert!(m.dependencies().is_empty());
    }

    #[test]
    fn ui_settings_alias_is_read_as_settings() {
        let yaml = r#"
name: p
version: "1.0"
required_backend: ">=0.1.0"
ui_settings:
  threshold: 0.5
"#;
        let m = PluginManifest::parse(yaml).unwrap();
        assert_eq!(m.settings["threshold"], serde_json::json!(0.5));
    }

    #[test]
    fn missing_required_backend_fails_to_parse() {
        let yaml = "name: p\nversion: \"1.0\"\n";
        assert!(PluginManifest::parse(yaml).is_err());
    }
}
