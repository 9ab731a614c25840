use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;
use crate::models::DatabaseType;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub query: QuerySettings,
    pub pool: PoolSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub dialect: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    /// Limit applied to `find` when the caller gives none
    #[serde(default)]
    pub default_limit: Option<u64>,
    /// Re-parse every compiled statement before execution
    pub verify_statements: bool,
    pub timeout_secs: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: None,
            verify_statements: false,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolSettings {
    /// Upper bound on open connections per pool
    pub max_size: usize,
    /// How long a caller waits for a free connection
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 16,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_size == 0 {
            return Err(AppError::Configuration("pool.max_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive for the binary's subscriber
    pub level: String,
}

/// Environment variable -> config key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("DATABASE_DIALECT", "database.dialect"),
    ("QUERY_DEFAULT_LIMIT", "query.default_limit"),
    ("QUERY_VERIFY_STATEMENTS", "query.verify_statements"),
    ("QUERY_TIMEOUT_SECS", "query.timeout_secs"),
    ("POOL_MAX_SIZE", "pool.max_size"),
    ("POOL_ACQUIRE_TIMEOUT_SECS", "pool.acquire_timeout_secs"),
    ("RUST_LOG", "logging.level"),
];

impl Config {
    /// Defaults, then `.env`, then process environment
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenv::dotenv();
        Self::load(None, |key| env::var(key).ok())
    }

    /// Defaults, then a config file, then process environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let _ = dotenv::dotenv();
        Self::load(Some(path.as_ref()), |key| env::var(key).ok())
    }

    /// Build from defaults, an optional file and an environment lookup
    pub fn load<F>(file: Option<&Path>, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let query = QuerySettings::default();
        let pool = PoolSettings::default();

        let mut builder = config::Config::builder()
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.dialect", "sqlite")?
            .set_default("query.verify_statements", query.verify_statements)?
            .set_default("query.timeout_secs", query.timeout_secs)?
            .set_default("pool.max_size", pool.max_size as u64)?
            .set_default("pool.acquire_timeout_secs", pool.acquire_timeout_secs)?
            .set_default("logging.level", "info")?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.database_type()?;
        config.pool.validate()?;
        Ok(config)
    }

    pub fn database_type(&self) -> Result<DatabaseType, AppError> {
        DatabaseType::from_str(&self.database.dialect).map_err(AppError::Configuration)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.query.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load(None, lookup(&[])).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database_type().unwrap(), DatabaseType::SQLite);
        assert_eq!(config.query.default_limit, None);
        assert!(!config.query.verify_statements);
        assert_eq!(config.statement_timeout(), Duration::from_secs(30));
        assert_eq!(config.pool, PoolSettings::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::load(
            None,
            lookup(&[
                ("DATABASE_URL", "postgresql://localhost/app"),
                ("DATABASE_DIALECT", "postgres"),
                ("QUERY_DEFAULT_LIMIT", "100"),
                ("QUERY_VERIFY_STATEMENTS", "true"),
                ("POOL_MAX_SIZE", "8"),
                ("RUST_LOG", "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(config.database_type().unwrap(), DatabaseType::PostgreSQL);
        assert_eq!(config.query.default_limit, Some(100));
        assert!(config.query.verify_statements);
        assert_eq!(config.pool.max_size, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_pool_settings_from_environment() {
        let config = Config::load(
            None,
            lookup(&[("POOL_MAX_SIZE", "4"), ("POOL_ACQUIRE_TIMEOUT_SECS", "3")]),
        )
        .unwrap();
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(3));

        let err = Config::load(None, lookup(&[("POOL_MAX_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref msg) if msg.contains("max_size")));
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let err = Config::load(None, lookup(&[("DATABASE_DIALECT", "oracle")])).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"sqlite://./mapper.db\"\ndialect = \"mysql\"\n\n[query]\ndefault_limit = 50\n\n[logging]\nlevel = \"db_query_mapper=debug\""
        )
        .unwrap();

        let config = Config::load(Some(file.path()), lookup(&[("DATABASE_DIALECT", "sqlite")])).unwrap();
        assert_eq!(config.database.url, "sqlite://./mapper.db");
        assert_eq!(config.query.default_limit, Some(50));
        assert_eq!(config.logging.level, "db_query_mapper=debug");
        // Environment wins over the file
        assert_eq!(config.database_type().unwrap(), DatabaseType::SQLite);
    }
}
