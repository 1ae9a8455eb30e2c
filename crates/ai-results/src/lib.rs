//! Persistence for completed AI tagging runs: models, per-run model links,
//! timespans, and duration aggregates (`SPEC_FULL.md` §4.7).
//!
//! Grounded in `ai_results_store.py` from the original implementation —
//! `store_scene_run` here is a line-for-line port of that module's
//! `store_scene_run`, `_upsert_models`, `_assign_run_models`,
//! `_store_scene_timespans`, and `_store_aggregates`, adapted from a
//! SQLAlchemy session to the JSON-snapshot stores used throughout this
//! codebase.

mod store;

pub use store::{AIResultsStore, StoredModelSummary, StoredSceneRun};
