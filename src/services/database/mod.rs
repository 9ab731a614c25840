// Database providers: statement execution for each supported engine
pub mod mysql;
pub mod postgresql;
pub mod provider;
pub mod sqlite;

pub use mysql::MySQLProvider;
pub use postgresql::PostgreSQLProvider;
pub use provider::{Provider, DEFAULT_STATEMENT_TIMEOUT};
pub use sqlite::SqliteProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::DatabaseType;
use crate::services::ConnectionPoolManager;

/// Factory function to create the provider for a database type
/// PostgreSQL and MySQL take their pools from `pool_manager`
pub async fn create_provider(
    database_type: DatabaseType,
    connection_url: &str,
    pool_manager: Arc<ConnectionPoolManager>,
    timeout: Duration,
) -> Result<Arc<dyn Provider>, AppError> {
    match database_type {
        DatabaseType::PostgreSQL => Ok(Arc::new(
            PostgreSQLProvider::connect(connection_url, &pool_manager)
                .await?
                .with_timeout(timeout),
        )),
        DatabaseType::MySQL => Ok(Arc::new(
            MySQLProvider::connect(connection_url, &pool_manager)
                .await?
                .with_timeout(timeout),
        )),
        DatabaseType::SQLite => Ok(Arc::new(SqliteProvider::from_url(connection_url)?.with_timeout(timeout))),
        DatabaseType::SqlServer => Err(AppError::Configuration(
            "No SQL Server provider is available; statements can only be compiled".to_string(),
        )),
    }
}
