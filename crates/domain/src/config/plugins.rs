use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plugin loader configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory under which installed plugins live, one subdirectory
    /// per plugin named after the plugin's manifest `name`.
    #[serde(default = "default_plugins_root")]
    pub plugins_root: PathBuf,
    /// The backend version advertised to plugins' `required_backend`
    /// constraints during compatibility checks.
    #[serde(default = "default_backend_version")]
    pub backend_version: String,
    /// Remote catalog sources, in addition to the implicit `local` source
    /// synthesized from on-disk manifests.
    #[serde(default)]
    pub sources: Vec<PluginSourceConfig>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            plugins_root: default_plugins_root(),
            backend_version: default_backend_version(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSourceConfig {
    pub name: String,
    pub index_url: String,
    #[serde(default = "super::d_true")]
    pub enabled: bool,
}

fn default_plugins_root() -> PathBuf {
    PathBuf::from("./data/plugins")
}

fn default_backend_version() -> String {
    "0.1.0".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plugins_root_is_data_plugins() {
        assert_eq!(PluginsConfig::default().plugins_root, PathBuf::from("./data/plugins"));
    }

    #[test]
    fn default_has_no_remote_sources() {
        assert!(PluginsConfig::default().sources.is_empty());
    }
}
