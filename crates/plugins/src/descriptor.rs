//! The statically-linked plugin descriptor.
//!
//! This codebase has no dynamic module loading (see `SPEC_FULL.md` §9,
//! "Dynamic plugin code loading"): a plugin is a first-party Rust value
//! built at process startup and handed to the [`crate::loader::PluginLoader`],
//! analogous to how this codebase's skill engine registers built-in skills
//! rather than importing them from disk. Every lifecycle stage the manifest
//! format describes — dependency DAG, migrations, settings schema, status
//! transitions — still applies; only "import arbitrary bytes from disk" is
//! replaced by "the descriptor was compiled in".

use std::sync::Arc;

use sf_domain::error::Result;
use sf_registries::{ActionRegistry, RecommenderRegistry, ServiceRegistry};

use crate::manifest::PluginManifest;

/// The registries a plugin's hooks act against, bundled so a
/// [`PluginRegistrar`] doesn't need three separate parameters.
pub struct RegistrationContext<'a> {
    pub origin: &'a str,
    pub actions: &'a ActionRegistry,
    pub services: &'a ServiceRegistry,
    pub recommenders: &'a RecommenderRegistry,
}

/// The `register()`/`unregister()` hooks a compiled-in plugin supplies.
/// Stands in for the original's conventionally-named module functions.
pub trait PluginRegistrar: Send + Sync {
    fn register(&self, ctx: &RegistrationContext<'_>) -> Result<()>;

    /// Default no-op: plugins with no teardown-sensitive state (most)
    /// don't need to override this — `unregister_origin` on each registry
    /// already purges their entries by origin token.
    fn unregister(&self, _ctx: &RegistrationContext<'_>) {}
}

/// One applied-in-order schema migration. `stem` is the lexicographic
/// `NNNN_*` identifier compared against a plugin's `migration_head`.
#[derive(Clone)]
pub struct Migration {
    pub stem: String,
    pub upgrade: Arc<dyn Fn() -> Result<()> + Send + Sync>,
}

impl Migration {
    pub fn new(stem: impl Into<String>, upgrade: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            stem: stem.into(),
            upgrade: Arc::new(upgrade),
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("stem", &self.stem).finish()
    }
}

/// A compiled-in plugin: its manifest plus the hooks the loader drives it
/// through. `registrar` is `None` for a disk-discovered plugin with no
/// matching compiled-in implementation (its catalog/meta rows still exist,
/// but the load step has nothing to invoke).
#[derive(Clone)]
pub struct PluginDescriptor {
    pub manifest: PluginManifest,
    pub registrar: Option<Arc<dyn PluginRegistrar>>,
    /// Migrations in declaration order; the loader applies only those
    /// whose stem sorts after the persisted `migration_head`.
    pub migrations: Vec<Migration>,
}

impl PluginDescriptor {
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            registrar: None,
            migrations: Vec::new(),
        }
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn PluginRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn with_migrations(mut self, migrations: Vec<Migration>) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_without_registrar_has_no_hooks() {
        let d = PluginDescriptor::new(
            PluginManifest::parse("name: p\nversion: \"1.0\"\nrequired_backend: \">=0.1.0\"\n").unwrap(),
        );
        assert!(d.registrar.is_none());
        assert_eq!(d.name(), "p");
    }

    #[test]
    fn migrations_sort_by_stem_when_applied_by_caller() {
        let mut stems: Vec<&str> = vec!["0002_b", "0001_a", "0010_c"];
        stems.sort();
        assert_eq!(stems, vec!["0001_a", "0002_b", "0010_c"]);
    }
}
