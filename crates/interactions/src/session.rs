//! Session resolution (`_find_or_create_session_id`) and stale
//! finalization (`SPEC_FULL.md` §4.6).

use chrono::{DateTime, Utc};
use sf_domain::config::InteractionConfig;

use crate::store::InteractionStore;

/// Resolve an incoming session id to its canonical session, creating or
/// merging as needed. `fingerprint` is the client fingerprint supplied
/// with the batch, if any.
pub fn find_or_create_session_id(
    store: &InteractionStore,
    incoming: &str,
    fingerprint: Option<&str>,
    now: DateTime<Utc>,
    config: &InteractionConfig,
) -> String {
    if store.is_canonical(incoming) {
        return incoming.to_string();
    }
    if let Some(canonical) = store.resolve_alias(incoming) {
        return canonical;
    }
    if let Some(fingerprint) = fingerprint {
        if let Some(canonical) =
            store.most_recent_mergeable_session(fingerprint, now, config.merge_ttl_seconds)
        {
            store.insert_alias(incoming, &canonical);
            return canonical;
        }
        finalize_stale(store, fingerprint, now, config);
        store.create_session(incoming, fingerprint, now);
        return incoming.to_string();
    }
    store.create_session(incoming, "", now);
    incoming.to_string()
}

fn finalize_stale(store: &InteractionStore, fingerprint: &str, now: DateTime<Utc>, config: &InteractionConfig) {
    let min_session_seconds = config.min_session_minutes * 60.0;
    let credited = store.finalize_stale_sessions(fingerprint, now, config.merge_ttl_seconds, min_session_seconds);
    for (entity_type, entity_id) in credited {
        store.bump_derived_o_count(&entity_type, &entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn known_canonical_session_returns_itself() {
        let store = InteractionStore::new();
        store.create_session("s1", "fp", ts(0));
        let config = InteractionConfig::default();
        assert_eq!(find_or_create_session_id(&store, "s1", Some("fp"), ts(1), &config), "s1");
    }

    #[test]
    fn known_alias_returns_canonical() {
        let store = InteractionStore::new();
        store.create_session("s1", "fp", ts(0));
        store.insert_alias("s2", "s1");
        let config = InteractionConfig::default();
        assert_eq!(find_or_create_session_id(&store, "s2", Some("fp"), ts(1), &config), "s1");
    }

    #[test]
    fn fingerprint_merge_creates_alias_for_recent_session() {
        let store = InteractionStore::new();
        store.create_session("a", "fp", ts(0));
        store.advance_last_event("a", ts(60));
        let config = InteractionConfig::default();

        let resolved = find_or_create_session_id(&store, "b", Some("fp"), ts(90), &config);
        assert_eq!(resolved, "a");
        assert_eq!(store.resolve_alias("b"), Some("a".to_string()));
    }

    #[test]
    fn fingerprint_past_merge_ttl_finalizes_and_creates_new_session() {
        let store = InteractionStore::new();
        store.create_session("a", "fp", ts(0));
        store.advance_last_event("a", ts(60));
        let config = InteractionConfig::default();

        find_or_create_session_id(&store, "b", Some("fp"), ts(90), &config);
        let resolved = find_or_create_session_id(&store, "c", Some("fp"), ts(90 + 120 + 1), &config);

        assert_eq!(resolved, "c");
        assert!(store.get_session("a").unwrap().ended_at.is_some());
        assert!(store.get_session("c").is_some());
    }
}
