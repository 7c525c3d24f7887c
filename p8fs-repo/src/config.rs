//! Repository process configuration, loaded from `P8FS_REPO__*` env
//! vars following `p8fs-core`'s `EnvConfig` loader convention.

use p8fs_core::EnvConfig;

use crate::dialect::Dialect;

#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Connection URL for `sqlx::Any` (`postgres://`, `mysql://`,
    /// `sqlite://`). `None` runs against the in-process `MemoryProvider`.
    pub database_url: Option<String>,
    pub dialect: Dialect,
    pub openai_api_key: Option<String>,
    pub openai_embedding_model: String,
    pub embedding_dimensions: usize,
}

impl RepoConfig {
    pub const ENV_PREFIX: &'static str = "P8FS_REPO__";

    pub fn from_env() -> Self {
        let env = EnvConfig::from_env(Self::ENV_PREFIX);
        let database_url = env.get_string("database.url");
        let dialect = match env.get_string("database.dialect").as_deref() {
            Some("tidb") | Some("mysql") => Dialect::TiDb,
            Some("sqlite") => Dialect::SqliteVec,
            _ => Dialect::Postgres,
        };
        Self {
            database_url,
            dialect,
            openai_api_key: env.get_string("embedding.openai_api_key"),
            openai_embedding_model: env.get_or("embedding.openai_model", "text-embedding-3-small"),
            embedding_dimensions: env.get_usize("embedding.dimensions").unwrap_or(1536),
        }
    }
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            dialect: Dialect::Postgres,
            openai_api_key: None,
            openai_embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_postgres_dialect_and_memory_provider() {
        let cfg = RepoConfig::default();
        assert_eq!(cfg.dialect, Dialect::Postgres);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn tidb_dialect_alias_recognized() {
        std::env::set_var("P8FS_REPO_TEST__DATABASE__DIALECT", "tidb");
        let env = EnvConfig::from_env("P8FS_REPO_TEST__");
        assert_eq!(env.get_string("database.dialect").as_deref(), Some("tidb"));
        std::env::remove_var("P8FS_REPO_TEST__DATABASE__DIALECT");
    }
}
