use std::sync::Arc;

use sf_ai_results::AIResultsStore;
use sf_domain::config::Config;
use sf_interactions::InteractionStore;
use sf_plugins::{CatalogFetcher, PluginLoader, PluginSourceStore};
use sf_registries::{ActionRegistry, RecommenderRegistry, ServiceRegistry};
use sf_settings::SettingsStore;
use sf_tasks::TaskManager;

use crate::events::EventHub;

/// Shared application state passed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<SettingsStore>,
    pub actions: Arc<ActionRegistry>,
    pub recommenders: Arc<RecommenderRegistry>,
    pub services: Arc<ServiceRegistry>,
    pub tasks: Arc<TaskManager>,
    pub plugins: Arc<PluginLoader>,
    pub plugin_sources: Arc<PluginSourceStore>,
    pub interactions: Arc<InteractionStore>,
    pub ai_results: Arc<AIResultsStore>,
    pub catalog_fetcher: Arc<dyn CatalogFetcher>,
    pub events: Arc<EventHub>,
}
