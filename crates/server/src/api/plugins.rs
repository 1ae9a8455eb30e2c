//! `/api/v1/plugins/*` admin surface: installed plugins, sources,
//! catalog aggregation, install/remove planning and execution, reload,
//! and per-plugin/system settings (`SPEC_FULL.md` §4.2, §6).

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use sf_domain::model::{PluginCatalogEntry, SYSTEM_PLUGIN_NAME};
use sf_plugins::discover_local;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn installed(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.plugins.meta().list())
}

pub async fn list_sources(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.plugin_sources.list())
}

#[derive(Debug, Deserialize)]
pub struct SetSourceEnabledRequest {
    enabled: bool,
}

pub async fn set_source_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetSourceEnabledRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = state.plugin_sources.set_enabled(&name, req.enabled)?;
    Ok(Json(source))
}

/// Local manifests plus every enabled remote source's index, merged the
/// way `plan_install`/`plan_remove` expect: one flat list of
/// `PluginCatalogEntry` across all sources.
async fn build_catalog(state: &AppState) -> Vec<PluginCatalogEntry> {
    let mut entries = discover_local(state.plugins.plugins_root()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to discover local plugin manifests");
        Vec::new()
    });

    for source in &state.config.plugins.sources {
        let Ok(row) = state.plugin_sources.require_enabled(&source.name) else {
            continue;
        };
        match state.catalog_fetcher.fetch(source).await {
            Ok(remote) => {
                state.plugin_sources.mark_refreshed(&row.name);
                entries.extend(remote);
            }
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "failed to fetch plugin catalog");
            }
        }
    }

    entries
}

pub async fn catalog(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_catalog(&state).await)
}

#[derive(Debug, Deserialize)]
pub struct PluginNameRequest {
    plugin_name: String,
}

pub async fn install_plan(
    State(state): State<AppState>,
    Json(req): Json<PluginNameRequest>,
) -> impl IntoResponse {
    let catalog = build_catalog(&state).await;
    Json(state.plugins.plan_install(&req.plugin_name, &catalog))
}

pub async fn install(
    State(state): State<AppState>,
    Json(req): Json<PluginNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = build_catalog(&state).await;
    let plan = state.plugins.plan_install(&req.plugin_name, &catalog);
    if !plan.missing.is_empty() {
        return Err(ApiError::conflict(
            "DEPENDENCY_MISSING",
            format!("unresolved dependencies: {}", plan.missing.join(", ")),
        ));
    }
    state.plugins.execute_install_plan(&plan)?;
    Ok(Json(plan))
}

/// Re-run the install plan for an already-active plugin (picks up any
/// new dependencies its manifest now declares) and reload it in place so
/// its current registration reflects the refreshed manifest/settings.
pub async fn update(
    State(state): State<AppState>,
    Json(req): Json<PluginNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = build_catalog(&state).await;
    let plan = state.plugins.plan_install(&req.plugin_name, &catalog);
    if !plan.missing.is_empty() {
        return Err(ApiError::conflict(
            "DEPENDENCY_MISSING",
            format!("unresolved dependencies: {}", plan.missing.join(", ")),
        ));
    }
    state.plugins.execute_install_plan(&plan)?;
    state.plugins.reload(&req.plugin_name)?;
    Ok(Json(plan))
}

pub async fn remove_plan(
    State(state): State<AppState>,
    Json(req): Json<PluginNameRequest>,
) -> impl IntoResponse {
    Json(state.plugins.plan_remove(&req.plugin_name))
}

pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<PluginNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = state.plugins.plan_remove(&req.plugin_name);
    if plan.order.len() > 1 {
        return Err(ApiError::conflict(
            "DEPENDENT_PLUGINS",
            format!(
                "{} depends on {}; remove dependents first",
                plan.order[..plan.order.len() - 1].join(", "),
                req.plugin_name
            ),
        ));
    }
    state.plugins.execute_remove(&req.plugin_name)?;
    Ok(Json(serde_json::json!({ "removed": req.plugin_name })))
}

pub async fn reload(
    State(state): State<AppState>,
    Json(req): Json<PluginNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.plugins.reload(&req.plugin_name)?;
    Ok(Json(serde_json::json!({ "reloaded": req.plugin_name })))
}

pub async fn get_plugin_settings(
    State(state): State<AppState>,
    Path(plugin): Path<String>,
) -> impl IntoResponse {
    Json(state.settings.list(&plugin))
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    key: String,
    value: Value,
}

pub async fn set_plugin_setting(
    State(state): State<AppState>,
    Path(plugin): Path<String>,
    Json(req): Json<SetSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let value = state.settings.set(&plugin, &req.key, req.value)?;
    Ok(Json(value))
}

pub async fn get_system_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.settings.list(SYSTEM_PLUGIN_NAME))
}

pub async fn set_system_setting(
    State(state): State<AppState>,
    Json(req): Json<SetSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let value = state.settings.set(SYSTEM_PLUGIN_NAME, &req.key, req.value)?;
    Ok(Json(value))
}
