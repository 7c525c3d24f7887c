//! Worker process configuration, loaded from `P8FS_WORKER__*` env vars.
//! One process binds to exactly one tier (§4.4: "one deployment per
//! tier").

use std::time::Duration;

use p8fs_core::EnvConfig;
use p8fs_broker::Tier;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tier: Tier,
    pub nats_url: Option<String>,
    /// `None` runs the repository against `MemoryProvider`.
    pub database_url: Option<String>,
    /// Fetch timeout: 5s in test mode, 30s in production (§4.4 step 1).
    pub fetch_timeout: Duration,
    pub fetch_batch_size: usize,
    /// Binds to a parallel TEST stream/consumer pair instead of the
    /// tier's production topology (§4.4 "test-mode variant").
    pub test_mode: bool,
}

impl WorkerConfig {
    pub const ENV_PREFIX: &'static str = "P8FS_WORKER__";

    pub fn from_env() -> Self {
        let env = EnvConfig::from_env(Self::ENV_PREFIX);
        let tier = match env.get_string("tier").as_deref() {
            Some("medium") => Tier::Medium,
            Some("large") => Tier::Large,
            _ => Tier::Small,
        };
        let test_mode = env.get_bool("test_mode").unwrap_or(false);
        Self {
            tier,
            nats_url: env.get_string("nats.url"),
            database_url: env.get_string("database.url"),
            fetch_timeout: Duration::from_secs(env.get_u64("fetch.timeout_secs").unwrap_or(if test_mode { 5 } else { 30 })),
            fetch_batch_size: env.get_usize("fetch.batch_size").unwrap_or(1),
            test_mode,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Small,
            nats_url: None,
            database_url: None,
            fetch_timeout: Duration::from_secs(30),
            fetch_batch_size: 1,
            test_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_small_tier_single_in_flight() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.tier, Tier::Small);
        assert_eq!(cfg.fetch_batch_size, 1);
    }
}
