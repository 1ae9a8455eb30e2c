use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sf_ai_results::AIResultsStore;
use sf_domain::config::{Config, ConfigSeverity, CorsConfig};
use sf_interactions::InteractionStore;
use sf_plugins::{HttpCatalogFetcher, PluginDescriptor, PluginLoader, PluginMetaStore, PluginSourceStore};
use sf_registries::{ActionRegistry, RecommenderRegistry, ServiceRegistry};
use sf_server::cli::{load_config, Cli, Command};
use sf_server::events::EventHub;
use sf_server::state::AppState;
use sf_server::api;
use sf_settings::SettingsStore;
use sf_tasks::TaskManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            let (config, config_path) = load_config()?;
            init_tracing(&config);
            tracing::info!(path = %config_path, "config loaded");
            run_server(Arc::new(config)).await
        }
        Some(Command::CheckConfig) => {
            let (config, config_path) = load_config()?;
            let issues = config.validate();
            println!("config: {config_path}");
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Structured JSON logging, optionally forwarded to an OTLP collector
/// when `observability.otlp_endpoint` is set.
fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sf_server=debug"));

    let Some(endpoint) = config.observability.otlp_endpoint.as_deref() else {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
        return;
    };

    let resource = Resource::builder_empty()
        .with_attribute(opentelemetry::KeyValue::new(
            "service.name",
            config.observability.service_name.clone(),
        ))
        .build();

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
            tracing::warn!(error = %e, "failed to build OTLP exporter, OTel tracing disabled");
            return;
        }
    };

    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::TraceIdRatioBased(config.observability.sample_rate))
        .with_batch_exporter(exporter)
        .build();
    global::set_tracer_provider(provider);
    let tracer = global::tracer(config.observability.service_name.clone());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Compiled-in plugin descriptors. Per the static-linking redesign
/// (`SPEC_FULL.md` §9), there is no dynamic module loader — a real
/// deployment adds concrete plugin crates as dependencies of this
/// binary and pushes their descriptors here.
fn builtin_descriptors() -> Vec<PluginDescriptor> {
    Vec::new()
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("stashforge starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let plugins_root = config.plugins.plugins_root.clone();
    std::fs::create_dir_all(&plugins_root).context("creating plugins_root")?;
    let data_root = plugins_root.parent().unwrap_or(&plugins_root).to_path_buf();

    // ── Settings store ───────────────────────────────────────────────
    let settings = Arc::new(
        SettingsStore::open(data_root.join("settings.json")).context("opening settings store")?,
    );
    tracing::info!("settings store ready");

    // ── Registries ───────────────────────────────────────────────────
    let actions = Arc::new(ActionRegistry::new());
    let recommenders = Arc::new(RecommenderRegistry::new());
    let services = Arc::new(ServiceRegistry::default());
    tracing::info!("action/recommender/service registries ready");

    // ── Task manager ─────────────────────────────────────────────────
    let tasks = TaskManager::new(actions.clone(), services.clone(), config.tasks.clone());
    tracing::info!(loop_interval_ms = config.tasks.loop_interval_ms, "task manager ready");

    // ── Plugin loader ────────────────────────────────────────────────
    let plugin_meta =
        PluginMetaStore::open(data_root.join("plugin_meta.json")).context("opening plugin meta store")?;
    let plugin_sources = Arc::new(
        PluginSourceStore::open(data_root.join("plugin_sources.json"), &config.plugins.sources)
            .context("opening plugin source store")?,
    );
    let plugins = Arc::new(PluginLoader::new(
        plugins_root.clone(),
        config.plugins.backend_version.clone(),
        builtin_descriptors(),
        plugin_meta,
        settings.clone(),
        actions.clone(),
        services.clone(),
        recommenders.clone(),
    ));
    plugins.initialize_plugins();
    tracing::info!(
        discovered = plugins.discovered_names().len(),
        "plugin loader ready"
    );

    // ── Interaction store ────────────────────────────────────────────
    let interactions =
        Arc::new(InteractionStore::open(data_root.join("interactions")).context("opening interaction store")?);
    tracing::info!("interaction store ready");

    // ── AI results store ─────────────────────────────────────────────
    let ai_results =
        Arc::new(AIResultsStore::open(data_root.join("ai_results.json")).context("opening AI results store")?);
    tracing::info!("AI results store ready");

    // ── Event hub ────────────────────────────────────────────────────
    let events = EventHub::new();
    events.attach(&tasks);
    tracing::info!("event hub attached to task manager");

    let state = AppState {
        config: config.clone(),
        settings,
        actions,
        recommenders,
        services,
        tasks: tasks.clone(),
        plugins,
        plugin_sources,
        interactions,
        ai_results,
        catalog_fetcher: Arc::new(HttpCatalogFetcher::default()),
        events,
    };

    // ── Task runner loop ─────────────────────────────────────────────
    tokio::spawn(tasks.clone().run_forever());
    tracing::info!("task runner loop started");

    // Stale interaction sessions are finalized opportunistically per
    // fingerprint during ingestion (`sf_interactions::session::finalize_stale`),
    // so no standalone sweep loop is needed here.

    // ── CORS ──────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Rate limiting ─────────────────────────────────────────────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second as u64)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    let router = api::router(state.clone()).layer(cors_layer);
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "stashforge listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

/// Build a [`CorsLayer`] from configured allowed origins. Origins may end
/// in `:*` to allow any port on that host; a lone `"*"` allows every
/// origin and disables credentialed CORS.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
