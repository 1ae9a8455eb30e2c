//! Plugin catalog discovery: on-disk `local` source plus pluggable remote
//! fetchers (`SPEC_FULL.md` §4.2, §6 wire format).

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sf_domain::config::PluginSourceConfig;
use sf_domain::error::{Error, Result};
use sf_domain::model::{PluginCatalogEntry, LOCAL_SOURCE_NAME};

use crate::manifest::PluginManifest;

/// `plugins_index.json` wire format served by a remote catalog source.
#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(rename = "schemaVersion")]
    #[allow(dead_code)]
    schema_version: u32,
    plugins: Vec<IndexPlugin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexPlugin {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "humanName", default)]
    #[allow(dead_code)]
    human_name: Option<String>,
    #[serde(rename = "serverLink", default)]
    #[allow(dead_code)]
    server_link: Option<String>,
    #[serde(rename = "dependsOn", default)]
    depends_on: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    path: Option<String>,
}

/// Fetches a remote source's catalog index. Implementations typically hit
/// `{index_url}/plugins_index.json`; tests supply a stub so catalog
/// planning is testable without the network.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, source: &PluginSourceConfig) -> Result<Vec<PluginCatalogEntry>>;
}

/// Default HTTP fetcher against the documented wire format.
pub struct HttpCatalogFetcher {
    client: reqwest::Client,
}

impl Default for HttpCatalogFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogFetcher {
    async fn fetch(&self, source: &PluginSourceConfig) -> Result<Vec<PluginCatalogEntry>> {
        let url = format!("{}/plugins_index.json", source.index_url.trim_end_matches('/'));
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Other(format!("fetching {url}: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Other(format!("reading {url}: {e}")))?;
        parse_index(&source.name, &body)
    }
}

fn parse_index(source_name: &str, body: &str) -> Result<Vec<PluginCatalogEntry>> {
    let index: IndexFile = serde_json::from_str(body)?;
    Ok(index
        .plugins
        .into_iter()
        .map(|p| PluginCatalogEntry {
            source: source_name.to_string(),
            plugin_name: p.name,
            version: p.version,
            description: p.description,
            dependencies: p.depends_on,
            manifest: serde_json::Value::Null,
        })
        .collect())
}

/// Discover `*/plugin.yml` under `plugins_root`, synthesizing `local`
/// catalog rows. Directories with a missing or malformed manifest are
/// skipped and logged, never aborting the scan (`SPEC_FULL.md` §10.4
/// tolerant-directory-scan convention, mirrored from the skills loader).
pub fn discover_local(plugins_root: &Path) -> Result<Vec<PluginCatalogEntry>> {
    let mut entries = Vec::new();
    if !plugins_root.exists() {
        return Ok(entries);
    }
    for dir_entry in std::fs::read_dir(plugins_root)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        let manifest_path = path.join("plugin.yml");
        if !manifest_path.exists() {
            continue;
        }
        let raw = match std::fs::read_to_string(&manifest_path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "skipping unreadable plugin manifest");
                continue;
            }
        };
        let manifest = match PluginManifest::parse(&raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "skipping malformed plugin manifest");
                continue;
            }
        };
        let folder_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if folder_name != manifest.name {
            tracing::warn!(
                folder = %folder_name,
                manifest_name = %manifest.name,
                "plugin folder name does not match manifest name, skipping"
            );
            continue;
        }
        entries.push(PluginCatalogEntry {
            source: LOCAL_SOURCE_NAME.to_string(),
            plugin_name: manifest.name.clone(),
            version: manifest.version.clone(),
            description: String::new(),
            dependencies: manifest.dependencies(),
            manifest: serde_json::to_value(&manifest)?,
        });
    }
    entries.sort_by(|a, b| a.plugin_name.cmp(&b.plugin_name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_local_skips_folders_without_manifest_and_mismatched_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("no-manifest")).unwrap();

        std::fs::create_dir_all(dir.path().join("real-plugin")).unwrap();
        std::fs::write(
            dir.path().join("real-plugin/plugin.yml"),
            "name: real-plugin\nversion: \"1.0.0\"\nrequired_backend: \">=0.1.0\"\ndepends_on: [other]\n",
        )
        .unwrap();

        std::fs::create_dir_all(dir.path().join("mismatched")).unwrap();
        std::fs::write(
            dir.path().join("mismatched/plugin.yml"),
            "name: something-else\nversion: \"1.0.0\"\nrequired_backend: \">=0.1.0\"\n",
        )
        .unwrap();

        std::fs::create_dir_all(dir.path().join("no-required-backend")).unwrap();
        std::fs::write(
            dir.path().join("no-required-backend/plugin.yml"),
            "name: no-required-backend\nversion: \"1.0.0\"\n",
        )
        .unwrap();

        let entries = discover_local(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].plugin_name, "real-plugin");
        assert_eq!(entries[0].dependencies, vec!["other"]);
    }

    #[test]
    fn discover_local_on_missing_root_returns_empty() {
        let entries = discover_local(Path::new("/does/not/exist")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn parse_index_maps_wire_format_to_catalog_entries() {
        let body = r#"{
            "schemaVersion": 1,
            "plugins": [
                {"name": "a", "version": "1.0.0", "description": "desc",
                 "humanName": "A", "serverLink": null,
                 "dependsOn": ["b"], "path": "plugins/a"}
            ]
        }"#;
        let entries = parse_index("remote", body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "remote");
        assert_eq!(entries[0].dependencies, vec!["b"]);
    }
}
