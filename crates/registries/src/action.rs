//! Action registry: `action_id → (handler, context filter)` dispatch table
//! (`SPEC_FULL.md` §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parking_lot::RwLock;
use sf_domain::error::Result;
use sf_domain::model::TaskRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Dialog,
    Stream,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    None,
    Single,
    Multi,
    Page,
}

/// One context rule on an action declaration. An action is visible for a
/// `ContextInput` if *any* of its rules matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRule {
    /// Pages this rule applies to; empty means "any page".
    #[serde(default)]
    pub pages: Vec<String>,
    pub selection: Selection,
    /// Entity types this rule applies to; empty means "any entity type".
    #[serde(default)]
    pub entity_types: Vec<String>,
}

impl ContextRule {
    pub fn matches(&self, ctx: &ContextInput) -> bool {
        let page_ok = self.pages.is_empty() || self.pages.iter().any(|p| p == &ctx.page);
        if !page_ok {
            return false;
        }
        let selection_ok = match self.selection {
            Selection::None => true,
            Selection::Single => ctx.is_detail_view || ctx.selected_ids.len() == 1,
            Selection::Multi => !ctx.selected_ids.is_empty(),
            Selection::Page => !ctx.visible_ids.is_empty(),
        };
        if !selection_ok {
            return false;
        }
        if self.entity_types.is_empty() {
            return true;
        }
        match &ctx.entity_type {
            Some(t) => self.entity_types.iter().any(|et| et == t),
            None => false,
        }
    }
}

/// The UI context an action-resolution request is made from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextInput {
    pub page: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Entity type of the current detail view / selection, when relevant
    /// to `ContextRule::entity_types` gating.
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub is_detail_view: bool,
    #[serde(default)]
    pub selected_ids: Vec<String>,
    #[serde(default)]
    pub visible_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: String,
    pub label: String,
    pub service: String,
    pub result_kind: ResultKind,
    pub contexts: Vec<ContextRule>,
    #[serde(default)]
    pub controller: bool,
}

impl ActionDescriptor {
    pub fn matches(&self, ctx: &ContextInput) -> bool {
        self.contexts.iter().any(|rule| rule.matches(ctx))
    }
}

/// Plain action handler: `(context, params) -> result`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, context: Value, params: Value) -> Result<Value>;
}

/// Controller-style action handler: additionally receives the task record
/// so it can spawn and track child tasks (`group_id`).
#[async_trait]
pub trait ControllerHandler: Send + Sync {
    async fn call(&self, context: Value, params: Value, task: &TaskRecord) -> Result<Value>;
}

#[derive(Clone)]
pub enum ActionHandlerKind {
    Plain(Arc<dyn ActionHandler>),
    Controller(Arc<dyn ControllerHandler>),
}

#[derive(Clone)]
pub struct RegisteredAction {
    pub descriptor: ActionDescriptor,
    pub handler: ActionHandlerKind,
    /// The plugin name that registered this action; used to bulk-unregister
    /// on plugin remove/reload.
    pub origin: String,
}

#[derive(Default)]
pub struct ActionRegistry {
    entries: RwLock<HashMap<String, RegisteredAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        origin: impl Into<String>,
        descriptor: ActionDescriptor,
        handler: ActionHandlerKind,
    ) {
        let origin = origin.into();
        let id = descriptor.id.clone();
        self.entries.write().insert(
            id,
            RegisteredAction {
                descriptor,
                handler,
                origin,
            },
        );
    }

    /// Remove every action registered by `origin` (a plugin name).
    pub fn unregister_origin(&self, origin: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, v| v.origin != origin);
        before - entries.len()
    }

    pub fn get(&self, id: &str) -> Option<RegisteredAction> {
        self.entries.read().get(id).cloned()
    }

    /// Every action whose any `ContextRule` matches `ctx`.
    pub fn resolve(&self, ctx: &ContextInput) -> Vec<ActionDescriptor> {
        self.entries
            .read()
            .values()
            .filter(|r| r.descriptor.matches(ctx))
            .map(|r| r.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    #[async_trait]
    impl ActionHandler for Noop {
        async fn call(&self, _c: Value, _p: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn descriptor(id: &str, rules: Vec<ContextRule>) -> ActionDescriptor {
        ActionDescriptor {
            id: id.into(),
            label: id.into(),
            service: "svc".into(),
            result_kind: ResultKind::Void,
            contexts: rules,
            controller: false,
        }
    }

    #[test]
    fn resolve_matches_single_selection_rule() {
        let reg = ActionRegistry::new();
        reg.register(
            "plugin-a",
            descriptor(
                "tag_scene",
                vec![ContextRule {
                    pages: vec!["scenes".into()],
                    selection: Selection::Single,
                    entity_types: vec![],
                }],
            ),
            ActionHandlerKind::Plain(Arc::new(Noop)),
        );

        let ctx = ContextInput {
            page: "scenes".into(),
            is_detail_view: true,
            ..Default::default()
        };
        assert_eq!(reg.resolve(&ctx).len(), 1);

        let wrong_page = ContextInput {
            page: "galleries".into(),
            is_detail_view: true,
            ..Default::default()
        };
        assert!(reg.resolve(&wrong_page).is_empty());
    }

    #[test]
    fn multi_selection_requires_nonempty_selected_ids() {
        let rule = ContextRule {
            pages: vec![],
            selection: Selection::Multi,
            entity_types: vec![],
        };
        let ok = ContextInput {
            selected_ids: vec!["1".into()],
            ..Default::default()
        };
        let bad = ContextInput::default();
        assert!(rule.matches(&ok));
        assert!(!rule.matches(&bad));
    }

    #[test]
    fn unregister_origin_removes_only_that_plugins_actions() {
        let reg = ActionRegistry::new();
        reg.register(
            "plugin-a",
            descriptor("a1", vec![ContextRule { pages: vec![], selection: Selection::None, entity_types: vec![] }]),
            ActionHandlerKind::Plain(Arc::new(Noop)),
        );
        reg.register(
            "plugin-b",
            descriptor("b1", vec![ContextRule { pages: vec![], selection: Selection::None, entity_types: vec![] }]),
            ActionHandlerKind::Plain(Arc::new(Noop)),
        );
        assert_eq!(reg.unregister_origin("plugin-a"), 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.get("b1").is_some());
    }

    #[test]
    fn entity_types_gate_requires_matching_ctx_entity_type() {
        let rule = ContextRule {
            pages: vec![],
            selection: Selection::None,
            entity_types: vec!["scene".into()],
        };
        let matching = ContextInput { entity_type: Some("scene".into()), ..Default::default() };
        let missing = ContextInput::default();
        assert!(rule.matches(&matching));
        assert!(!rule.matches(&missing));
    }
}
