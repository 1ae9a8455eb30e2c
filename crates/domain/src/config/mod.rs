mod interactions;
mod observability;
mod plugins;
mod server;
mod tasks;

pub use interactions::*;
pub use observability::*;
pub use plugins::*;
pub use server::*;
pub use tasks::*;

use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub interactions: InteractionConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Startup
    /// aborts only on `Error`-severity issues; `Warning`s are logged.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.tasks.loop_interval_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tasks.loop_interval_ms".into(),
                message: "loop_interval_ms must be greater than 0".into(),
            });
        }
        if self.tasks.history_prune_to >= self.tasks.history_cap {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tasks.history_prune_to".into(),
                message: format!(
                    "history_prune_to ({}) must be less than history_cap ({})",
                    self.tasks.history_prune_to, self.tasks.history_cap
                ),
            });
        }

        if self.interactions.segment_min_duration_seconds < 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "interactions.segment_min_duration_seconds".into(),
                message: "must not be negative".into(),
            });
        }
        if self.interactions.merge_ttl_seconds <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "interactions.merge_ttl_seconds".into(),
                message: "must be greater than 0".into(),
            });
        }

        let mut seen_sources = std::collections::HashSet::new();
        for (i, src) in self.plugins.sources.iter().enumerate() {
            if src.name.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("plugins.sources[{i}].name"),
                    message: "source name must not be empty".into(),
                });
            }
            if src.name == "local" {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("plugins.sources[{i}].name"),
                    message: "\"local\" is a reserved, immutable source name".into(),
                });
            }
            if !src.name.is_empty() && !seen_sources.insert(src.name.clone()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("plugins.sources[{i}].name"),
                    message: format!("duplicate plugin source name \"{}\"", src.name),
                });
            }
            if !src.index_url.starts_with("http://") && !src.index_url.starts_with("https://") {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("plugins.sources[{i}].index_url"),
                    message: "index_url must start with http:// or https://".into(),
                });
            }
        }

        errors
    }
}
