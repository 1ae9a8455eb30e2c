//! HTTP surface: the action/task/interaction/recommendation/plugin API
//! described in `SPEC_FULL.md` §6, wired over the in-process registries,
//! task manager, plugin loader, and stores built in the other crates.

pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod events;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
