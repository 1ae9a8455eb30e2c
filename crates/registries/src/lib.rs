//! Action, recommender, and service registries: context-filtered dispatch
//! tables bound to the task manager (`SPEC_FULL.md` §4.3, §4.4).

pub mod action;
pub mod recommender;
pub mod service;

pub use action::{
    ActionDescriptor, ActionHandler, ActionHandlerKind, ActionRegistry, ContextInput, ContextRule,
    ControllerHandler, RegisteredAction, ResultKind, Selection,
};
pub use recommender::{
    RecContext, RecommendationPage, RecommendationQuery, RecommenderCapabilities,
    RecommenderDescriptor, RecommenderHandler, RecommenderRegistry,
};
pub use service::{
    HttpReadinessProbe, ReadinessProbe, ReadinessState, ReadinessStatus, ServiceDef,
    ServiceRegistry,
};
