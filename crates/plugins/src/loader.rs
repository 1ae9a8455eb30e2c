//! Plugin loader: discovery, dependency-ordered activation, migrations,
//! install/remove/reload planning (`SPEC_FULL.md` §4.2).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use sf_domain::error::{Error, Result};
use sf_domain::model::{PluginCatalogEntry, PluginStatus};
use sf_registries::{ActionRegistry, RecommenderRegistry, ServiceRegistry};
use sf_settings::SettingsStore;

use crate::descriptor::{PluginDescriptor, RegistrationContext};
use crate::store::PluginMetaStore;
use crate::version::VersionConstraint;

/// Result of `plan_install`'s dependency walk (`SPEC_FULL.md` §4.2).
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallPlan {
    /// Plugins to activate, dependencies-first, target last.
    pub order: Vec<String>,
    /// `order` minus the target itself.
    pub dependencies: Vec<String>,
    pub already_active: Vec<String>,
    pub missing: Vec<String>,
    pub human_names: HashMap<String, String>,
}

/// Result of `plan_remove`'s dependents walk. `order` lists the target's
/// transitive dependents (leaf-first) followed by the target itself —
/// the order a full cascading removal would proceed in. A plain
/// single-plugin removal only needs `order.last()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemovePlan {
    pub order: Vec<String>,
}

fn human_name(entry: &PluginCatalogEntry) -> String {
    entry
        .manifest
        .get("human_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| entry.plugin_name.clone())
}

/// Owns the set of compiled-in plugin descriptors and drives them through
/// the lifecycle the manifest format describes.
pub struct PluginLoader {
    plugins_root: PathBuf,
    backend_version: String,
    descriptors: RwLock<HashMap<String, PluginDescriptor>>,
    meta: PluginMetaStore,
    settings: Arc<SettingsStore>,
    actions: Arc<ActionRegistry>,
    services: Arc<ServiceRegistry>,
    recommenders: Arc<RecommenderRegistry>,
}

impl PluginLoader {
    pub fn new(
        plugins_root: impl Into<PathBuf>,
        backend_version: impl Into<String>,
        descriptors: Vec<PluginDescriptor>,
        meta: PluginMetaStore,
        settings: Arc<SettingsStore>,
        actions: Arc<ActionRegistry>,
        services: Arc<ServiceRegistry>,
        recommenders: Arc<RecommenderRegistry>,
    ) -> Self {
        let mut by_name = HashMap::new();
        for d in descriptors {
            by_name.insert(d.name().to_string(), d);
        }
        Self {
            plugins_root: plugins_root.into(),
            backend_version: backend_version.into(),
            descriptors: RwLock::new(by_name),
            meta,
            settings,
            actions,
            services,
            recommenders,
        }
    }

    pub fn plugins_root(&self) -> &std::path::Path {
        &self.plugins_root
    }

    pub fn meta(&self) -> &PluginMetaStore {
        &self.meta
    }

    pub fn discovered_names(&self) -> Vec<String> {
        self.descriptors.read().keys().cloned().collect()
    }

    fn is_active(&self, name: &str) -> bool {
        self.meta.get(name).map(|m| m.status.is_active()).unwrap_or(false)
    }

    fn version_compatible(&self, required: &str) -> bool {
        VersionConstraint::parse(required)
            .map(|c| c.matches(&self.backend_version))
            .unwrap_or(false)
    }

    /// Register manifest-declared `settings|ui_settings|config` keys into
    /// the settings store, one row per top-level key, without clobbering
    /// an existing override (idempotent across reloads).
    fn register_settings_schema(&self, plugin: &str, settings: &Value) {
        let Some(obj) = settings.as_object() else {
            return;
        };
        for (key, default) in obj {
            if self.settings.get(plugin, key).is_err() {
                if let Err(e) = self.settings.set(plugin, key, default.clone()) {
                    tracing::warn!(plugin, key, error = %e, "failed to register plugin setting");
                }
            }
        }
    }

    /// Apply pending migrations: only stems sorting after the persisted
    /// `migration_head` run, in lexicographic order. Each migration runs
    /// against a rollback snapshot of the plugin's meta row taken just
    /// before the closure executes — failure restores that snapshot
    /// (transactional, all-or-nothing per `SPEC_FULL.md` §4.2).
    fn apply_migrations(&self, descriptor: &PluginDescriptor) -> Result<()> {
        let name = descriptor.name();
        let head = self.meta.get(name).and_then(|m| m.migration_head);
        let mut pending: Vec<&crate::descriptor::Migration> = descriptor
            .migrations
            .iter()
            .filter(|m| head.as_deref().map(|h| m.stem.as_str() > h).unwrap_or(true))
            .collect();
        pending.sort_by(|a, b| a.stem.cmp(&b.stem));

        for migration in pending {
            let rollback = self.meta.get(name);
            if let Err(e) = (migration.upgrade)() {
                if let Some(snapshot) = rollback {
                    self.meta.upsert(snapshot);
                }
                return Err(Error::Plugin(format!(
                    "migration {} failed: {e}",
                    migration.stem
                )));
            }
            self.meta.set_migration_head(name, migration.stem.clone());
        }
        Ok(())
    }

    fn invoke_register(&self, descriptor: &PluginDescriptor) -> Result<()> {
        let Some(registrar) = &descriptor.registrar else {
            return Ok(());
        };
        let ctx = RegistrationContext {
            origin: descriptor.name(),
            actions: &self.actions,
            services: &self.services,
            recommenders: &self.recommenders,
        };
        registrar.register(&ctx)
    }

    fn invoke_unregister(&self, descriptor: &PluginDescriptor) {
        let Some(registrar) = &descriptor.registrar else {
            return;
        };
        let ctx = RegistrationContext {
            origin: descriptor.name(),
            actions: &self.actions,
            services: &self.services,
            recommenders: &self.recommenders,
        };
        registrar.unregister(&ctx);
    }

    /// Load one plugin through the version-check / migration / settings /
    /// register sequence (step 4 of the initialization protocol). Errors
    /// are recorded on the plugin's meta row rather than propagated — the
    /// caller continues with the next plugin either way.
    fn load_one(&self, descriptor: &PluginDescriptor) {
        let name = descriptor.name();
        self.meta.get_or_create(name, &descriptor.manifest.version);

        if !self.version_compatible(&descriptor.manifest.required_backend) {
            self.meta.set_status(name, PluginStatus::Incompatible);
            return;
        }

        if let Err(e) = self.apply_migrations(descriptor) {
            self.meta.set_error(name, truncate(&e.to_string()));
            return;
        }

        // "pip install" step: modeled as a best-effort, logged no-op —
        // there is no Rust-native analog to installing external Python
        // packages at runtime.
        if !descriptor.manifest.pip_dependencies.is_empty() {
            tracing::info!(
                plugin = name,
                deps = ?descriptor.manifest.pip_dependencies,
                "skipping pip-equivalent install step (no-op in this backend)"
            );
        }

        self.register_settings_schema(name, &descriptor.manifest.settings);

        match self.invoke_register(descriptor) {
            Ok(()) => self.meta.set_status(name, PluginStatus::Active),
            Err(e) => self.meta.set_error(name, truncate(&e.to_string())),
        }
    }

    /// Run the full initialization protocol (`SPEC_FULL.md` §4.2 steps 1-5)
    /// over every compiled-in descriptor.
    pub fn initialize_plugins(&self) {
        let names: HashSet<String> = self.descriptors.read().keys().cloned().collect();

        // Steps 1-2: every descriptor has already been "discovered" at
        // construction time; ensure a meta row exists for each.
        for name in &names {
            let descriptor = self.descriptors.read().get(name).cloned();
            if let Some(descriptor) = descriptor {
                self.meta.get_or_create(name, &descriptor.manifest.version);
            }
        }

        // Step 3: mark plugins with an unresolvable dependency.
        let mut missing_marked = HashSet::new();
        for name in &names {
            let deps = self
                .descriptors
                .read()
                .get(name)
                .map(|d| d.manifest.dependencies())
                .unwrap_or_default();
            if deps.iter().any(|d| !names.contains(d)) {
                self.meta.set_status(name, PluginStatus::DependencyMissing);
                missing_marked.insert(name.clone());
            }
        }

        // Step 4: iterative topological convergence.
        let mut remaining: HashSet<String> = names.difference(&missing_marked).cloned().collect();
        loop {
            let loadable: Vec<String> = remaining
                .iter()
                .filter(|name| {
                    let deps = self
                        .descriptors
                        .read()
                        .get(*name)
                        .map(|d| d.manifest.dependencies())
                        .unwrap_or_default();
                    deps.iter().all(|d| self.is_active(d))
                })
                .cloned()
                .collect();

            if loadable.is_empty() {
                break;
            }

            for name in &loadable {
                let descriptor = self.descriptors.read().get(name).cloned();
                if let Some(descriptor) = descriptor {
                    self.load_one(&descriptor);
                }
                remaining.remove(name);
            }
        }

        // Step 5: classify whatever never became active.
        for name in &remaining {
            let deps = self
                .descriptors
                .read()
                .get(name)
                .map(|d| d.manifest.dependencies())
                .unwrap_or_default();
            let cycle = deps.iter().any(|d| remaining.contains(d));
            let status = if cycle {
                PluginStatus::DependencyCycle
            } else {
                PluginStatus::DependencyInactive
            };
            self.meta.set_status(name, status);
        }
    }

    /// Walk the dependency DAG of `catalog` rows from `target`, depth
    /// first, same order as the original's `dfs` helper.
    pub fn plan_install(&self, target: &str, catalog: &[PluginCatalogEntry]) -> InstallPlan {
        let by_name: HashMap<&str, &PluginCatalogEntry> =
            catalog.iter().map(|e| (e.plugin_name.as_str(), e)).collect();
        let mut plan = InstallPlan::default();
        let mut visited = HashSet::new();
        self.dfs_install(target, &by_name, &mut visited, &mut plan);
        plan.dependencies = plan
            .order
            .iter()
            .filter(|n| n.as_str() != target)
            .cloned()
            .collect();
        plan
    }

    fn dfs_install(
        &self,
        name: &str,
        by_name: &HashMap<&str, &PluginCatalogEntry>,
        visited: &mut HashSet<String>,
        plan: &mut InstallPlan,
    ) {
        if visited.contains(name) {
            return;
        }
        visited.insert(name.to_string());

        let Some(entry) = by_name.get(name) else {
            plan.missing.push(name.to_string());
            return;
        };
        plan.human_names.insert(name.to_string(), human_name(entry));

        if self.is_active(name) {
            plan.already_active.push(name.to_string());
            return;
        }

        for dep in &entry.dependencies {
            self.dfs_install(dep, by_name, visited, plan);
        }
        plan.order.push(name.to_string());
    }

    /// The transitive dependents of `target` among compiled-in descriptors,
    /// leaf-first, followed by `target` — the order a full cascading
    /// removal of `target` and everything relying on it would proceed in.
    pub fn plan_remove(&self, target: &str) -> RemovePlan {
        let descriptors = self.descriptors.read();
        let direct_dependents = |name: &str| -> Vec<String> {
            descriptors
                .values()
                .filter(|d| d.manifest.dependencies().iter().any(|dep| dep == name))
                .map(|d| d.name().to_string())
                .collect()
        };

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let roots: Vec<String> = direct_dependents(target);
        fn visit(
            name: &str,
            direct_dependents: &impl Fn(&str) -> Vec<String>,
            visited: &mut HashSet<String>,
            order: &mut Vec<String>,
        ) {
            if visited.contains(name) {
                return;
            }
            visited.insert(name.to_string());
            for dep in direct_dependents(name) {
                visit(&dep, direct_dependents, visited, order);
            }
            order.push(name.to_string());
        }
        for name in roots {
            visit(&name, &direct_dependents, &mut visited, &mut order);
        }
        order.push(target.to_string());
        RemovePlan { order }
    }

    /// Remove a single plugin: unregister hooks, purge its registry
    /// entries by origin, drop plugin settings rows, mark `removed`, and
    /// cascade direct dependents to `dependency_missing`.
    pub fn execute_remove(&self, name: &str) -> Result<()> {
        let descriptor = self
            .descriptors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin {name}")))?;

        self.invoke_unregister(&descriptor);
        self.actions.unregister_origin(name);
        self.services.unregister_origin(name);
        self.recommenders.unregister_origin(name);

        for row in self.settings.list(name) {
            let _ = self.settings.set(name, &row.key, Value::Null);
        }

        self.meta.set_status(name, PluginStatus::Removed);
        self.descriptors.write().remove(name);

        let dependents: Vec<String> = self
            .descriptors
            .read()
            .values()
            .filter(|d| d.manifest.dependencies().iter().any(|dep| dep == name))
            .map(|d| d.name().to_string())
            .collect();
        for dependent in dependents {
            self.meta.set_status(&dependent, PluginStatus::DependencyMissing);
        }

        Ok(())
    }

    /// Execute a previously computed [`InstallPlan`]'s `order`: activate
    /// each compiled-in descriptor via the normal load sequence.
    ///
    /// Unlike the original's dynamic loader, a catalog entry with no
    /// matching compiled-in [`PluginDescriptor`] cannot be instantiated at
    /// runtime (§9 redesign note) — execution stops at the first such
    /// name and returns `DEPENDENCY_MISSING`, leaving already-activated
    /// plugins in the plan active.
    pub fn execute_install_plan(&self, plan: &InstallPlan) -> Result<()> {
        for name in &plan.order {
            let descriptor = self.descriptors.read().get(name).cloned();
            let Some(descriptor) = descriptor else {
                return Err(Error::Conflict(format!("DEPENDENCY_MISSING: {name}")));
            };
            self.load_one(&descriptor);
            if !self.is_active(name) {
                return Err(Error::Plugin(format!("plugin {name} failed to activate")));
            }
        }
        Ok(())
    }

    /// Re-run the migration and registration sequence for a single
    /// already-discovered plugin, without deleting files or settings.
    pub fn reload(&self, name: &str) -> Result<()> {
        let descriptor = self
            .descriptors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound("PLUGIN_NOT_FOUND".to_string()))?;

        if !self.version_compatible(&descriptor.manifest.required_backend) {
            self.meta.set_status(name, PluginStatus::Incompatible);
            return Err(Error::Plugin(format!(
                "BACKEND_TOO_OLD: {} requires {}, backend is {}",
                name, descriptor.manifest.required_backend, self.backend_version
            )));
        }

        self.load_one(&descriptor);
        Ok(())
    }
}

fn truncate(message: &str) -> String {
    if message.len() > 2000 {
        message.chars().take(2000).collect()
    } else {
        message.to_string()
    }
}
