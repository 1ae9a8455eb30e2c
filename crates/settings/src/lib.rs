//! Typed key/value settings store, per-plugin and per-system
//! (`SPEC_FULL.md` §4.1).

pub mod coerce;
pub mod defs;
pub mod store;

pub use coerce::{coerce, PathMapping, SlashMode};
pub use store::SettingsStore;
