//! Service registry: groups a plugin's actions under a named concurrency
//! budget, with an optional remote-readiness probe (`SPEC_FULL.md` §4.4).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Unknown,
    Ready,
    Waiting,
    Unreachable,
    /// Services with no `server_url` are always ready (nothing to probe).
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub state: ReadinessState,
    pub detail: String,
    pub last_ready_success: Option<DateTime<Utc>>,
    pub last_ready_failure: Option<DateTime<Utc>>,
}

impl Default for ReadinessStatus {
    fn default() -> Self {
        Self {
            state: ReadinessState::Unknown,
            detail: String::new(),
            last_ready_success: None,
            last_ready_failure: None,
        }
    }
}

/// A remote health check. Implementations typically hit a service's
/// `ready_endpoint` over HTTP; tests supply a stub.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, service: &ServiceDef) -> Result<(), String>;
}

/// Default HTTP-based probe: `GET {server_url}{ready_endpoint}`, treating
/// any 2xx response as ready.
pub struct HttpReadinessProbe {
    client: reqwest::Client,
}

impl Default for HttpReadinessProbe {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn probe(&self, service: &ServiceDef) -> Result<(), String> {
        let url = match &service.server_url {
            Some(base) => format!("{base}{}", service.ready_endpoint.as_deref().unwrap_or("")),
            None => return Ok(()),
        };
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(format!("status {}", resp.status())),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDef {
    pub name: String,
    pub max_concurrency: usize,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub ready_endpoint: Option<String>,
    #[serde(default = "default_readiness_cache_seconds")]
    pub readiness_cache_seconds: f64,
    #[serde(default = "default_failure_backoff_seconds")]
    pub failure_backoff_seconds: f64,
}

fn default_readiness_cache_seconds() -> f64 {
    30.0
}
fn default_failure_backoff_seconds() -> f64 {
    15.0
}

struct RegisteredService {
    def: ServiceDef,
    origin: String,
    status: ReadinessStatus,
    /// When set, readiness checks return `Waiting` without re-probing
    /// until this instant passes (failure backoff).
    backoff_until: Option<DateTime<Utc>>,
    cached_until: Option<DateTime<Utc>>,
}

pub struct ServiceRegistry {
    services: RwLock<HashMap<String, RegisteredService>>,
    probe: Arc<dyn ReadinessProbe>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(Arc::new(HttpReadinessProbe::default()))
    }
}

impl ServiceRegistry {
    pub fn new(probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            probe,
        }
    }

    pub fn register(&self, origin: impl Into<String>, def: ServiceDef) {
        let initial_state = if def.server_url.is_some() {
            ReadinessState::Unknown
        } else {
            ReadinessState::Local
        };
        self.services.write().insert(
            def.name.clone(),
            RegisteredService {
                def,
                origin: origin.into(),
                status: ReadinessStatus {
                    state: initial_state,
                    ..Default::default()
                },
                backoff_until: None,
                cached_until: None,
            },
        );
    }

    /// Drop a service's queue/config. Called on plugin removal.
    pub fn unregister_origin(&self, origin: &str) -> Vec<String> {
        let mut services = self.services.write();
        let dropped: Vec<String> = services
            .iter()
            .filter(|(_, v)| v.origin == origin)
            .map(|(k, _)| k.clone())
            .collect();
        for name in &dropped {
            services.remove(name);
        }
        dropped
    }

    pub fn get(&self, name: &str) -> Option<ServiceDef> {
        self.services.read().get(name).map(|r| r.def.clone())
    }

    pub fn status(&self, name: &str) -> Option<ReadinessStatus> {
        self.services.read().get(name).map(|r| r.status.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }

    /// Check (and possibly refresh) a service's readiness. Local services
    /// are always ready; during failure backoff, returns `false` without
    /// re-probing; a cached success within `readiness_cache_seconds` is
    /// reused without re-probing either.
    pub async fn is_ready(&self, name: &str) -> bool {
        let now = Utc::now();

        // Fast paths that don't require a network round trip.
        {
            let services = self.services.read();
            let Some(svc) = services.get(name) else {
                return false;
            };
            if svc.def.server_url.is_none() {
                return true;
            }
            if let Some(until) = svc.backoff_until {
                if now < until {
                    return false;
                }
            }
            if let Some(until) = svc.cached_until {
                if now < until && svc.status.state == ReadinessState::Ready {
                    return true;
                }
            }
        }

        let def = match self.services.read().get(name) {
            Some(svc) => svc.def.clone(),
            None => return false,
        };

        let result = self.probe.probe(&def).await;
        let mut services = self.services.write();
        let Some(svc) = services.get_mut(name) else {
            return false;
        };
        match result {
            Ok(()) => {
                svc.status.state = ReadinessState::Ready;
                svc.status.detail.clear();
                svc.status.last_ready_success = Some(now);
                svc.backoff_until = None;
                svc.cached_until =
                    Some(now + chrono_duration(svc.def.readiness_cache_seconds));
                true
            }
            Err(detail) => {
                svc.status.state = ReadinessState::Unreachable;
                svc.status.detail = detail;
                svc.status.last_ready_failure = Some(now);
                svc.backoff_until =
                    Some(now + chrono_duration(svc.def.failure_backoff_seconds));
                false
            }
        }
    }
}

fn chrono_duration(seconds: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((seconds * 1000.0) as i64)
}

/// Helper for callers that want a `std::time::Duration` for e.g. a
/// `tokio::time::sleep` from `readiness_cache_seconds`-style fields.
pub fn as_std_duration(seconds: f64) -> Duration {
    Duration::from_millis((seconds.max(0.0) * 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFail;
    #[async_trait]
    impl ReadinessProbe for AlwaysFail {
        async fn probe(&self, _service: &ServiceDef) -> Result<(), String> {
            Err("boom".into())
        }
    }

    struct AlwaysOk;
    #[async_trait]
    impl ReadinessProbe for AlwaysOk {
        async fn probe(&self, _service: &ServiceDef) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn local_service_without_server_url_is_always_ready() {
        let registry = ServiceRegistry::default();
        registry.register(
            "plugin-a",
            ServiceDef {
                name: "local-svc".into(),
                max_concurrency: 1,
                server_url: None,
                ready_endpoint: None,
                readiness_cache_seconds: 30.0,
                failure_backoff_seconds: 15.0,
            },
        );
        assert_eq!(
            registry.status("local-svc").unwrap().state,
            ReadinessState::Local
        );
    }

    #[tokio::test]
    async fn failure_enters_backoff_then_recovers() {
        let registry = ServiceRegistry::new(Arc::new(AlwaysFail));
        registry.register(
            "plugin-a",
            ServiceDef {
                name: "remote-svc".into(),
                max_concurrency: 1,
                server_url: Some("http://example.invalid".into()),
                ready_endpoint: Some("/ready".into()),
                readiness_cache_seconds: 30.0,
                failure_backoff_seconds: 60.0,
            },
        );
        assert!(!registry.is_ready("remote-svc").await);
        assert_eq!(
            registry.status("remote-svc").unwrap().state,
            ReadinessState::Unreachable
        );
    }

    #[tokio::test]
    async fn success_caches_ready_state() {
        let registry = ServiceRegistry::new(Arc::new(AlwaysOk));
        registry.register(
            "plugin-a",
            ServiceDef {
                name: "remote-svc".into(),
                max_concurrency: 1,
                server_url: Some("http://example.invalid".into()),
                ready_endpoint: Some("/ready".into()),
                readiness_cache_seconds: 30.0,
                failure_backoff_seconds: 60.0,
            },
        );
        assert!(registry.is_ready("remote-svc").await);
        assert_eq!(registry.status("remote-svc").unwrap().state, ReadinessState::Ready);
    }

    #[test]
    fn unregister_origin_drops_only_that_plugins_services() {
        let registry = ServiceRegistry::default();
        registry.register("plugin-a", ServiceDef { name: "a".into(), max_concurrency: 1, server_url: None, ready_endpoint: None, readiness_cache_seconds: 30.0, failure_backoff_seconds: 15.0 });
        registry.register("plugin-b", ServiceDef { name: "b".into(), max_concurrency: 1, server_url: None, ready_endpoint: None, readiness_cache_seconds: 30.0, failure_backoff_seconds: 15.0 });
        let dropped = registry.unregister_origin("plugin-a");
        assert_eq!(dropped, vec!["a".to_string()]);
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
    }
}
