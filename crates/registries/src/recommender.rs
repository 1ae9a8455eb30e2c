//! Recommender registry: same pattern as the action registry, keyed by
//! `id`, with declared contexts, a config schema, and capability flags
//! (`SPEC_FULL.md` §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sf_domain::error::Result;

/// Closed set of contexts a recommender may declare support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecContext {
    GlobalFeed,
    SimilarScene,
    SimilarPerformer,
    LibraryDetail,
    Home,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommenderCapabilities {
    #[serde(default)]
    pub supports_pagination: bool,
    #[serde(default)]
    pub exposes_scores: bool,
    #[serde(default)]
    pub needs_seed_scenes: bool,
    #[serde(default)]
    pub allows_multi_seed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderDescriptor {
    pub id: String,
    pub label: String,
    pub contexts: Vec<RecContext>,
    /// A JSON-schema-shaped blob describing the recommender's `config`.
    #[serde(default)]
    pub config_schema: Value,
    #[serde(default)]
    pub capabilities: RecommenderCapabilities,
}

impl RecommenderDescriptor {
    pub fn supports(&self, ctx: RecContext) -> bool {
        self.contexts.contains(&ctx)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationPage {
    pub scenes: Vec<Value>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    pub seed_scene_ids: Vec<String>,
    pub config: Value,
    pub limit: usize,
    pub offset: usize,
}

#[async_trait]
pub trait RecommenderHandler: Send + Sync {
    async fn query(&self, context: RecContext, query: RecommendationQuery) -> Result<RecommendationPage>;
}

struct Registered {
    descriptor: RecommenderDescriptor,
    handler: Arc<dyn RecommenderHandler>,
    origin: String,
}

#[derive(Default)]
pub struct RecommenderRegistry {
    entries: RwLock<HashMap<String, Registered>>,
}

impl RecommenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        origin: impl Into<String>,
        descriptor: RecommenderDescriptor,
        handler: Arc<dyn RecommenderHandler>,
    ) {
        let id = descriptor.id.clone();
        self.entries.write().insert(
            id,
            Registered {
                descriptor,
                handler,
                origin: origin.into(),
            },
        );
    }

    pub fn unregister_origin(&self, origin: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, v| v.origin != origin);
        before - entries.len()
    }

    /// List recommenders that declare support for `ctx`.
    pub fn list_for_context(&self, ctx: RecContext) -> Vec<RecommenderDescriptor> {
        self.entries
            .read()
            .values()
            .filter(|r| r.descriptor.supports(ctx))
            .map(|r| r.descriptor.clone())
            .collect()
    }

    pub async fn query(
        &self,
        id: &str,
        ctx: RecContext,
        query: RecommendationQuery,
    ) -> Result<RecommendationPage> {
        let handler = {
            let entries = self.entries.read();
            let entry = entries
                .get(id)
                .ok_or_else(|| sf_domain::error::Error::NotFound(format!("recommender {id}")))?;
            if !entry.descriptor.supports(ctx) {
                return Err(sf_domain::error::Error::Validation(format!(
                    "recommender {id} does not support context {ctx:?}"
                )));
            }
            entry.handler.clone()
        };
        handler.query(ctx, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    #[async_trait]
    impl RecommenderHandler for Echo {
        async fn query(&self, _ctx: RecContext, q: RecommendationQuery) -> Result<RecommendationPage> {
            Ok(RecommendationPage { scenes: vec![], total: q.seed_scene_ids.len(), has_more: false })
        }
    }

    #[test]
    fn list_for_context_filters_by_declared_contexts() {
        let reg = RecommenderRegistry::new();
        reg.register(
            "plugin-a",
            RecommenderDescriptor {
                id: "tfidf".into(),
                label: "TF-IDF".into(),
                contexts: vec![RecContext::SimilarScene],
                config_schema: Value::Null,
                capabilities: RecommenderCapabilities::default(),
            },
            Arc::new(Echo),
        );
        assert_eq!(reg.list_for_context(RecContext::SimilarScene).len(), 1);
        assert_eq!(reg.list_for_context(RecContext::GlobalFeed).len(), 0);
    }

    #[tokio::test]
    async fn query_rejects_unsupported_context() {
        let reg = RecommenderRegistry::new();
        reg.register(
            "plugin-a",
            RecommenderDescriptor {
                id: "tfidf".into(),
                label: "TF-IDF".into(),
                contexts: vec![RecContext::SimilarScene],
                config_schema: Value::Null,
                capabilities: RecommenderCapabilities::default(),
            },
            Arc::new(Echo),
        );
        let res = reg
            .query("tfidf", RecContext::GlobalFeed, RecommendationQuery::default())
            .await;
        assert!(res.is_err());
    }
}
