//! HTTP router: a public group (no auth) merged with a protected group
//! gated by [`crate::auth::require_admin_key`], following this codebase's
//! gateway ancestor's `api/mod.rs` public/protected split
//! (`SPEC_FULL.md` §6).

pub mod actions;
pub mod health;
pub mod interactions;
pub mod plugins;
pub mod recommendations;
pub mod tasks;
pub mod version;
pub mod ws;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_admin_key;
use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/v1/version", get(version::version))
        .route("/api/v1/system/health", get(health::health));

    let protected = Router::new()
        .route("/api/v1/actions/available", post(actions::available))
        .route("/api/v1/actions/submit", post(actions::submit))
        .route("/api/v1/tasks", get(tasks::list_tasks))
        .route("/api/v1/tasks/history", get(tasks::history))
        .route("/api/v1/tasks/events/ws", get(ws::task_events_ws))
        .route("/api/v1/tasks/:id", get(tasks::get_task))
        .route("/api/v1/tasks/:id/cancel", post(tasks::cancel_task))
        .route("/api/v1/tasks/:id/events", get(tasks::task_events_sse))
        .route("/api/v1/interactions/sync", post(interactions::sync))
        .route(
            "/api/v1/recommendations/recommenders",
            get(recommendations::list_recommenders),
        )
        .route("/api/v1/recommendations/query", post(recommendations::query))
        .route("/api/v1/plugins/installed", get(plugins::installed))
        .route(
            "/api/v1/plugins/sources",
            get(plugins::list_sources),
        )
        .route(
            "/api/v1/plugins/sources/:name",
            post(plugins::set_source_enabled),
        )
        .route("/api/v1/plugins/catalog", get(plugins::catalog))
        .route("/api/v1/plugins/install/plan", post(plugins::install_plan))
        .route("/api/v1/plugins/install", post(plugins::install))
        .route("/api/v1/plugins/update", post(plugins::update))
        .route("/api/v1/plugins/remove/plan", post(plugins::remove_plan))
        .route("/api/v1/plugins/remove", post(plugins::remove))
        .route("/api/v1/plugins/reload", post(plugins::reload))
        .route(
            "/api/v1/plugins/settings/:plugin",
            get(plugins::get_plugin_settings).post(plugins::set_plugin_setting),
        )
        .route(
            "/api/v1/plugins/system/settings",
            get(plugins::get_system_settings).post(plugins::set_system_setting),
        )
        .route_layer(middleware::from_fn_with_state(state, require_admin_key));

    public.merge(protected).layer(TraceLayer::new_for_http())
}
