use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task manager configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static fallback for the task scheduler. The runtime-mutable
/// `TASK_LOOP_INTERVAL` / `TASK_DEBUG` system settings (seeded with their
/// own, UI-facing defaults) take precedence whenever the settings store is
/// reachable; this is what governs behavior before the store has been
/// seeded or in tests that construct a scheduler directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
    #[serde(default)]
    pub debug: bool,
    /// Terminal-state history retention: soft cap before pruning kicks in.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Number of rows kept after an overflow prune.
    #[serde(default = "default_history_prune_to")]
    pub history_prune_to: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            loop_interval_ms: default_loop_interval_ms(),
            debug: false,
            history_cap: default_history_cap(),
            history_prune_to: default_history_prune_to(),
        }
    }
}

fn default_loop_interval_ms() -> u64 {
    50
}

fn default_history_cap() -> usize {
    600
}

fn default_history_prune_to() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loop_interval_is_50ms() {
        assert_eq!(TaskConfig::default().loop_interval_ms, 50);
    }

    #[test]
    fn default_history_caps() {
        let cfg = TaskConfig::default();
        assert_eq!(cfg.history_cap, 600);
        assert_eq!(cfg.history_prune_to, 500);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: TaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.loop_interval_ms, 50);
        assert!(!cfg.debug);
    }
}
