//! Environment-driven configuration, TOML/JSON-agnostic by design:
//! everything loads from `PREFIX__SECTION__KEY` style env vars (`__`
//! maps to `.`) into a small typed key/value snapshot that each binary's
//! own config struct (`BlobConfig`, `BrokerConfig`, `RouterConfig`,
//! `WorkerConfig`, `RepoConfig`) can read from.

use std::collections::HashMap;
use std::env;

#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    values: HashMap<String, String>,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Load every env var starting with `prefix` (e.g. `P8FS__`),
    /// normalizing `FOO__BAR_BAZ` into `bar_baz` after stripping the
    /// prefix and lower-casing.
    pub fn from_env(prefix: &str) -> Self {
        let mut values = HashMap::new();
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                values.insert(normalized, value);
            }
        }
        Self { values }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: impl Into<String>) -> String {
        self.get_string(key).unwrap_or_else(|| default.into())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_underscore_becomes_dot() {
        std::env::set_var("P8FS_TEST__BLOB__PART_SIZE_BYTES", "8388608");
        let cfg = EnvConfig::from_env("P8FS_TEST__");
        assert_eq!(cfg.get_u64("blob.part_size_bytes"), Some(8_388_608));
        std::env::remove_var("P8FS_TEST__BLOB__PART_SIZE_BYTES");
    }
}
