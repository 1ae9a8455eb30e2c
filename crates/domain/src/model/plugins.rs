use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    New,
    Active,
    Error,
    Incompatible,
    DependencyMissing,
    DependencyInactive,
    DependencyCycle,
    Removed,
}

impl PluginStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
    pub required_backend: Option<String>,
    pub status: PluginStatus,
    /// Lexicographic stem (`NNNN_*`) of the last applied migration, if any.
    pub migration_head: Option<String>,
    pub last_error: Option<String>,
}

impl PluginMeta {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            required_backend: None,
            status: PluginStatus::New,
            migration_head: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_meta_starts_in_new_status() {
        let m = PluginMeta::new("stash-tagger", "1.0.0");
        assert_eq!(m.status, PluginStatus::New);
        assert!(!m.status.is_active());
    }
}
