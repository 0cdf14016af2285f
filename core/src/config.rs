//! Runtime configuration for the scheduler.

use serde::Deserialize;

use crate::dag::TerminationStrategy;

/// Top-level runtime configuration for a scheduler host process.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on entries the invocation driver will dispatch
    /// concurrently within a single `invoke_async` call.
    #[serde(default = "default_max_concurrent_dispatch")]
    pub max_concurrent_dispatch: usize,

    /// How often the driver polls for newly-ready entries when it has no
    /// in-progress completions to wait on, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Termination strategy applied to task groups that don't specify
    /// their own.
    #[serde(default = "default_termination_strategy")]
    pub default_termination_strategy: TerminationStrategy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatch: default_max_concurrent_dispatch(),
            poll_interval_ms: default_poll_interval_ms(),
            default_termination_strategy: default_termination_strategy(),
        }
    }
}

fn default_max_concurrent_dispatch() -> usize {
    16
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_termination_strategy() -> TerminationStrategy {
    TerminationStrategy::TerminateOnInProgressCompletion
}

impl RuntimeConfig {
    /// Load configuration from environment variables prefixed `TASKGRAPH__`.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TASKGRAPH").separator("__"))
            .build()?;

        let cfg: RuntimeConfig = config.try_deserialize().unwrap_or_default();
        Ok(cfg)
    }

    /// Load from a specific file path, falling back to environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TASKGRAPH").separator("__"))
            .build()?;

        let cfg: RuntimeConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_concurrent_dispatch, 16);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(
            config.default_termination_strategy,
            TerminationStrategy::TerminateOnInProgressCompletion
        );
    }
}
