// Shared connection pools
//
// PostgreSQL and MySQL providers borrow their pools from here, one pool per
// connection URL and engine. Every pool is sized by the same PoolSettings.

use deadpool_postgres::{ManagerConfig, PoolConfig, RecyclingMethod, Runtime};
use mysql_async::{Opts, OptsBuilder, PoolConstraints, PoolOpts};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_postgres::NoTls;

use crate::config::PoolSettings;
use crate::error::AppError;

pub struct ConnectionPoolManager {
    postgres: RwLock<HashMap<String, deadpool_postgres::Pool>>,
    mysql: RwLock<HashMap<String, mysql_async::Pool>>,
    settings: PoolSettings,
}

impl ConnectionPoolManager {
    pub fn new() -> Self {
        Self::with_settings(PoolSettings::default())
    }

    pub fn with_settings(settings: PoolSettings) -> Self {
        Self {
            postgres: RwLock::new(HashMap::new()),
            mysql: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Pool for a `postgresql://` URL; connections open lazily on first use
    pub async fn postgres_pool(&self, connection_url: &str) -> Result<deadpool_postgres::Pool, AppError> {
        let settings = &self.settings;
        cached(&self.postgres, connection_url, || {
            settings.validate()?;
            let mut cfg = deadpool_postgres::Config::new();
            cfg.url = Some(connection_url.to_string());
            cfg.manager = Some(ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            });
            let mut pool = PoolConfig::new(settings.max_size);
            pool.timeouts.wait = Some(settings.acquire_timeout());
            pool.timeouts.create = Some(settings.acquire_timeout());
            cfg.pool = Some(pool);

            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
                .map_err(|e| AppError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))
        })
        .await
    }

    /// Pool for a `mysql://` URL; connections open lazily on first use
    pub async fn mysql_pool(&self, connection_url: &str) -> Result<mysql_async::Pool, AppError> {
        let settings = &self.settings;
        cached(&self.mysql, connection_url, || {
            settings.validate()?;
            let opts = Opts::from_url(connection_url)
                .map_err(|e| AppError::Configuration(format!("Invalid MySQL URL: {}", e)))?;
            let constraints = PoolConstraints::new(0, settings.max_size).ok_or_else(|| {
                AppError::Configuration(format!("Invalid pool size {}", settings.max_size))
            })?;
            let builder = OptsBuilder::from_opts(opts).pool_opts(PoolOpts::default().with_constraints(constraints));
            Ok(mysql_async::Pool::new(builder))
        })
        .await
    }

    /// Number of pools created so far, across engines
    pub async fn pool_count(&self) -> usize {
        self.postgres.read().await.len() + self.mysql.read().await.len()
    }

    /// Mask credentials in connection URL for safe logging
    pub fn mask_credentials(url: &str) -> String {
        match url::Url::parse(url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "[invalid-url]".to_string(),
        }
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Double-checked lookup: concurrent callers for one URL share a single pool
async fn cached<P, F>(pools: &RwLock<HashMap<String, P>>, connection_url: &str, create: F) -> Result<P, AppError>
where
    P: Clone,
    F: FnOnce() -> Result<P, AppError>,
{
    if let Some(pool) = pools.read().await.get(connection_url) {
        return Ok(pool.clone());
    }

    let mut pools = pools.write().await;
    if let Some(pool) = pools.get(connection_url) {
        return Ok(pool.clone());
    }

    tracing::info!(
        "Creating connection pool for: {}",
        ConnectionPoolManager::mask_credentials(connection_url)
    );
    let pool = create().map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;
    pools.insert(connection_url.to_string(), pool.clone());
    Ok(pool)
}
