//! Engine configuration from environment variables.
//!
//! Uses the following environment variables:
//! - `TASKGRAPH_MAX_WORKERS`: worker pool budget (default: num_cpus * 2)
//! - `TASKGRAPH_NAME_PREFIX_LEN`: initial synthesized-name suffix length (default: 8)

use std::env;
use std::str::FromStr;

/// Default number of node-id characters appended to a synthesized name.
pub const DEFAULT_NAME_PREFIX_LEN: usize = 8;

/// Runtime knobs shared by both executor flavors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrently running node work items.
    pub max_workers: usize,

    /// Initial length of the node-id suffix used to synthesize names.
    pub name_prefix_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1) * 2,
            name_prefix_len: DEFAULT_NAME_PREFIX_LEN,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_workers: env_parse("TASKGRAPH_MAX_WORKERS", defaults.max_workers).max(1),
            name_prefix_len: env_parse("TASKGRAPH_NAME_PREFIX_LEN", defaults.name_prefix_len)
                .max(1),
        }
    }

    /// Test/builder override for the worker budget.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
