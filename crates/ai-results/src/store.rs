use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sf_domain::error::Result;
use sf_domain::model::{AIModel, AIModelRun, AIModelRunModel, AIModelRunStatus, AIResultAggregate, AIResultTimespan};
use sf_domain::storage::JsonSnapshot;

const ENTITY_TYPE_SCENE: &str = "scene";
const PAYLOAD_TYPE_TAG: &str = "tag";
/// Confidence assumed for a frame whose payload omits it. The original
/// stores `NULL` here; this store's `confidence` field is non-nullable, so
/// a missing value reads as full confidence rather than "unknown".
const DEFAULT_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModelSummary {
    pub model_name: String,
    pub model_type: String,
    pub model_id: Option<String>,
    pub version: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSceneRun {
    pub run: AIModelRun,
    /// `"{category}:{label}"` (or bare `label` when category is empty) →
    /// summed `duration_s` aggregate value.
    pub aggregates: HashMap<String, f64>,
    pub models: Vec<StoredModelSummary>,
}

#[derive(Default, Serialize, Deserialize, Clone)]
struct State {
    runs: Vec<AIModelRun>,
    models: HashMap<String, AIModel>,
    run_models: Vec<AIModelRunModel>,
    timespans: Vec<AIResultTimespan>,
    aggregates: Vec<AIResultAggregate>,
}

pub struct AIResultsStore {
    state: RwLock<State>,
    snapshot: Option<JsonSnapshot>,
}

impl AIResultsStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            snapshot: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = JsonSnapshot::new(path.into());
        let state: State = snapshot.load()?;
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(snapshot),
        })
    }

    fn persist(&self, state: &State) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(state) {
                tracing::warn!(error = %e, "failed to persist AI results snapshot");
            }
        }
    }

    /// Persist one completed scene run: upserts the model catalog, links
    /// the models that actually produced output in `result_payload`, then
    /// writes one timespan per frame and one duration aggregate per
    /// `(category, label)`. Mirrors `store_scene_run`'s single
    /// all-or-nothing transaction — every row lands in one snapshot write.
    ///
    /// `requested_models`, when given, takes the upsert catalog's model
    /// metadata from the action's declared models rather than from
    /// whatever `result_payload["models"]` reports; the *links* on this
    /// run, however, always come from `result_payload["models"]` — the
    /// models that actually ran — matching the original's asymmetry
    /// between catalog bookkeeping and per-run linkage.
    pub fn store_scene_run(
        &self,
        service: &str,
        scene_id: &str,
        input_params: Value,
        result_payload: Value,
        requested_models: Option<Vec<Value>>,
        mut resolve_reference: impl FnMut(&str, Option<&str>) -> Option<String>,
    ) -> AIModelRun {
        let payload_models: Vec<Value> = result_payload
            .get("models")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let models_for_upsert = requested_models.unwrap_or_else(|| payload_models.clone());

        let now = Utc::now();
        let mut state = self.state.write();

        for raw in &models_for_upsert {
            upsert_model(&mut state.models, service, raw);
        }

        let run = AIModelRun {
            id: Uuid::new_v4(),
            service: service.to_string(),
            entity_type: ENTITY_TYPE_SCENE.to_string(),
            entity_id: scene_id.to_string(),
            status: AIModelRunStatus::Completed,
            started_at: now,
            completed_at: Some(now),
            input_params: input_params.clone(),
            result_metadata: serde_json::json!({
                "schema_version": result_payload.get("schema_version"),
                "duration": result_payload.get("duration"),
                "frame_interval": result_payload.get("frame_interval"),
            }),
        };
        state.runs.push(run.clone());

        let frame_interval_s = result_payload.get("frame_interval").and_then(Value::as_f64);
        for raw in &payload_models {
            let (model_id, name) = model_identifier(raw);
            let model_name = normalized_name(model_id.as_deref(), name.as_deref());
            let own_params = raw
                .get("input_params")
                .filter(|v| v.is_object())
                .cloned()
                .unwrap_or_else(|| input_params.clone());
            state.run_models.push(AIModelRunModel {
                run_id: run.id,
                model_name,
                input_params: own_params,
                frame_interval_s,
            });
        }

        let mut reference_cache: HashMap<(Option<String>, String), Option<String>> = HashMap::new();
        let mut totals: HashMap<(Option<String>, String), f64> = HashMap::new();

        if let Some(timespans) = result_payload.get("timespans").and_then(Value::as_object) {
            for (category, tags) in timespans {
                let Some(tags) = tags.as_object() else { continue };
                let category_name = Some(category.clone());
                for (label, frames) in tags {
                    let Some(frames) = frames.as_array() else { continue };
                    let reference_id = *reference_cache
                        .entry((category_name.clone(), label.clone()))
                        .or_insert_with(|| resolve_reference(label, category_name.as_deref()));

                    for frame in frames {
                        let Some(frame) = frame.as_object() else { continue };
                        let start = frame.get("start").and_then(Value::as_f64).unwrap_or(0.0);
                        let end = frame.get("end").and_then(Value::as_f64);
                        let confidence = frame
                            .get("confidence")
                            .and_then(Value::as_f64)
                            .unwrap_or(DEFAULT_CONFIDENCE);

                        let ts = match end {
                            None => AIResultTimespan::zero_width(
                                run.id,
                                scene_id,
                                PAYLOAD_TYPE_TAG,
                                category_name.clone(),
                                label.clone(),
                                reference_id.clone(),
                                start,
                                confidence,
                            ),
                            Some(end_val) => AIResultTimespan {
                                run_id: run.id,
                                entity_id: scene_id.to_string(),
                                payload_type: PAYLOAD_TYPE_TAG.to_string(),
                                category: category_name.clone(),
                                label: label.clone(),
                                reference_id: reference_id.clone(),
                                start_s: start,
                                end_s: end_val,
                                confidence,
                            },
                        };
                        let span = (ts.end_s - ts.start_s).max(0.0);
                        *totals.entry((category_name.clone(), label.clone())).or_insert(0.0) += span;
                        state.timespans.push(ts);
                    }
                }
            }
        }

        for ((category, label), value) in totals {
            state.aggregates.push(AIResultAggregate {
                run_id: run.id,
                entity_id: scene_id.to_string(),
                payload_type: PAYLOAD_TYPE_TAG.to_string(),
                category: category.unwrap_or_default(),
                label,
                metric: "duration_s".to_string(),
                value,
            });
        }

        self.persist(&state);
        run
    }

    pub fn get_latest_scene_run(&self, service: &str, scene_id: &str) -> Option<StoredSceneRun> {
        let state = self.state.read();
        let run = state
            .runs
            .iter()
            .filter(|r| r.service == service && r.entity_type == ENTITY_TYPE_SCENE && r.entity_id == scene_id)
            .max_by(|a, b| a.completed_at.cmp(&b.completed_at).then(a.id.cmp(&b.id)))?
            .clone();

        let mut aggregates = HashMap::new();
        for agg in state.aggregates.iter().filter(|a| a.run_id == run.id && a.metric == "duration_s") {
            let key = if agg.category.is_empty() {
                agg.label.clone()
            } else {
                format!("{}:{}", agg.category, agg.label)
            };
            aggregates.insert(key, agg.value);
        }

        let models = state
            .run_models
            .iter()
            .filter(|rm| rm.run_id == run.id)
            .map(|rm| {
                let model = state
                    .models
                    .values()
                    .find(|m| m.service == service && m.name == rm.model_name);
                StoredModelSummary {
                    model_name: rm.model_name.clone(),
                    model_type: model.map(|m| m.kind.clone()).unwrap_or_default(),
                    model_id: model.and_then(|m| m.model_id.clone()),
                    version: model.map(|m| m.version.clone()).unwrap_or_default(),
                    categories: model.map(|m| m.categories.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Some(StoredSceneRun { run, aggregates, models })
    }

    /// Timespans for a scene's most recent run, optionally narrowed to one
    /// category. Returns an empty vec if the scene has no stored run.
    pub fn get_scene_timespans(&self, service: &str, scene_id: &str, category: Option<&str>) -> Vec<AIResultTimespan> {
        let state = self.state.read();
        let Some(run_id) = state
            .runs
            .iter()
            .filter(|r| r.service == service && r.entity_type == ENTITY_TYPE_SCENE && r.entity_id == scene_id)
            .max_by(|a, b| a.completed_at.cmp(&b.completed_at).then(a.id.cmp(&b.id)))
            .map(|r| r.id)
        else {
            return Vec::new();
        };
        state
            .timespans
            .iter()
            .filter(|t| t.run_id == run_id && category.map_or(true, |c| t.category.as_deref() == Some(c)))
            .cloned()
            .collect()
    }

    /// Convenience wrapper over [`Self::get_latest_scene_run`] returning
    /// just the `duration_s` totals keyed `"{category}:{label}"`.
    pub fn get_scene_tag_totals(&self, service: &str, scene_id: &str) -> HashMap<String, f64> {
        self.get_latest_scene_run(service, scene_id)
            .map(|r| r.aggregates)
            .unwrap_or_default()
    }
}

impl Default for AIResultsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// `(model_id, name)` extracted from a loose model descriptor, accepting
/// `identifier` / `model_id` / `external_id` as aliases in that priority
/// order — matching plugins that report their model id under any of
/// these three keys.
fn model_identifier(raw: &Value) -> (Option<String>, Option<String>) {
    let model_id = raw
        .get("identifier")
        .or_else(|| raw.get("model_id"))
        .or_else(|| raw.get("external_id"))
        .and_then(value_to_string);
    let name = raw.get("name").and_then(Value::as_str).map(str::to_string);
    (model_id, name)
}

fn normalized_name(model_id: Option<&str>, name: Option<&str>) -> String {
    name.map(str::to_string)
        .or_else(|| model_id.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn string_array(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

const UPSERT_EXCLUDED_KEYS: &[&str] = &[
    "identifier",
    "model_id",
    "external_id",
    "name",
    "version",
    "type",
    "categories",
];

fn upsert_model(models: &mut HashMap<String, AIModel>, service: &str, raw: &Value) {
    let (model_id, name) = model_identifier(raw);
    let normalized = normalized_name(model_id.as_deref(), name.as_deref());
    let key = model_key(service, model_id.as_deref(), &normalized);

    let version = raw.get("version").and_then(value_to_string).unwrap_or_default();
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    let categories = string_array(raw.get("categories"));
    let extra = raw
        .as_object()
        .map(|obj| {
            Value::Object(
                obj.iter()
                    .filter(|(k, _)| !UPSERT_EXCLUDED_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        })
        .unwrap_or(Value::Null);
    let has_extra = extra.as_object().map(|o| !o.is_empty()).unwrap_or(false);

    match models.get_mut(&key) {
        Some(existing) => {
            existing.name = normalized;
            existing.version = version;
            existing.kind = kind;
            existing.categories = categories;
            if has_extra {
                existing.extra = extra;
            }
        }
        None => {
            models.insert(
                key,
                AIModel {
                    service: service.to_string(),
                    model_id,
                    name: normalized,
                    version,
                    kind,
                    categories,
                    extra: if has_extra { extra } else { Value::Null },
                },
            );
        }
    }
}

fn model_key(service: &str, model_id: Option<&str>, name: &str) -> String {
    format!("{service}\u{1}{}\u{1}{name}", model_id.unwrap_or(""))
}
