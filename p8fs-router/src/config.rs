//! Router process configuration, loaded from `P8FS_ROUTER__*` env vars
//! following `p8fs-core`'s `EnvConfig` loader convention.

use std::time::Duration;

use p8fs_core::EnvConfig;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `nats://...` URL for the production broker backend. `None` runs
    /// against an in-process `MemoryBroker` (local dev / tests).
    pub nats_url: Option<String>,
    /// Max messages pulled per fetch (§4.3 step 2: "a batch of 1–N").
    pub fetch_batch_size: usize,
    /// Fetch timeout, fixed at 30s by §4.3.
    pub fetch_timeout: Duration,
}

impl RouterConfig {
    pub const ENV_PREFIX: &'static str = "P8FS_ROUTER__";

    pub fn from_env() -> Self {
        let env = EnvConfig::from_env(Self::ENV_PREFIX);
        Self {
            nats_url: env.get_string("nats.url"),
            fetch_batch_size: env.get_usize("fetch.batch_size").unwrap_or(25),
            fetch_timeout: Duration::from_secs(env.get_u64("fetch.timeout_secs").unwrap_or(30)),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            fetch_batch_size: 25,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_topology_table() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.fetch_batch_size, 25);
    }
}
