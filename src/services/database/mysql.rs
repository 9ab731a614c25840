// MySQL provider using connection pooling for optimal resource management
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Params, Pool, Value as MySqlValue};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::{Duration, Instant};
use url::Url;

use crate::error::AppError;
use crate::models::{DatabaseType, PreparedStatement, Row, RowSet};
use crate::services::connection_pool::ConnectionPoolManager;
use crate::services::database::provider::{decimal_to_json, timeout_error, Provider, DEFAULT_STATEMENT_TIMEOUT};

pub struct MySQLProvider {
    pool: Pool,
    timeout: Duration,
}

impl MySQLProvider {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    /// Validate the URL and take a pool for it from the manager
    pub async fn connect(connection_url: &str, pool_manager: &ConnectionPoolManager) -> Result<Self, AppError> {
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Configuration(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(AppError::Configuration(
                "URL must use mysql:// or mariadb:// scheme".to_string(),
            ));
        }

        // mysql_async only understands the mysql:// scheme
        let normalized = connection_url.replacen("mariadb://", "mysql://", 1);
        let pool = pool_manager.mysql_pool(&normalized).await?;
        Ok(Self::new(pool))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get MySQL connection from pool: {}", e)))
    }

    async fn run(&self, statement: &PreparedStatement) -> Result<RowSet, AppError> {
        let mut conn = self.get_conn().await?;
        let start_time = Instant::now();

        let params = if statement.params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(statement.params.iter().map(json_to_mysql).collect())
        };

        if !statement.returns_rows() {
            conn.exec_drop(statement.sql.as_str(), params).await?;
            return Ok(RowSet::from_write(
                conn.affected_rows(),
                conn.last_insert_id(),
                start_time.elapsed().as_millis() as u64,
            ));
        }

        let rows: Vec<mysql_async::Row> = conn.exec(statement.sql.as_str(), params).await?;

        // Convert rows to JSON
        let mut json_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut row_obj = Row::new();
            for (idx, column) in row.columns_ref().iter().enumerate() {
                let column_name = column.name_str();
                if row_obj.contains_key(column_name.as_ref()) {
                    continue;
                }
                let value = match row.get_opt::<MySqlValue, usize>(idx) {
                    Some(Ok(mysql_val)) => mysql_column_to_json(mysql_val, column.column_type()),
                    Some(Err(_)) | None => Value::Null,
                };
                row_obj.insert(column_name.to_string(), value);
            }
            json_rows.push(row_obj);
        }

        Ok(RowSet::from_rows(json_rows, start_time.elapsed().as_millis() as u64))
    }
}

#[async_trait::async_trait]
impl Provider for MySQLProvider {
    async fn execute(&self, statement: &PreparedStatement) -> Result<RowSet, AppError> {
        tokio::time::timeout(self.timeout, self.run(statement))
            .await
            .map_err(|_| timeout_error(self.timeout))?
            .map_err(|e| {
                tracing::error!("MySQL statement failed: {}", e);
                e
            })
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let mut conn = self.get_conn().await?;
        conn.ping().await?;
        Ok(())
    }
}

fn json_to_mysql(value: &Value) -> MySqlValue {
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(b) => MySqlValue::Int(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MySqlValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                MySqlValue::UInt(u)
            } else {
                MySqlValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => MySqlValue::Bytes(s.clone().into_bytes()),
        other => MySqlValue::Bytes(other.to_string().into_bytes()),
    }
}

/// DECIMAL arrives as text; read it as a number like the other providers do
fn mysql_column_to_json(mysql_val: MySqlValue, column_type: ColumnType) -> Value {
    match (column_type, mysql_val) {
        (ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL, MySqlValue::Bytes(bytes)) => {
            let parsed = std::str::from_utf8(&bytes).ok().and_then(|s| Decimal::from_str(s).ok());
            match parsed {
                Some(decimal) => decimal_to_json(decimal),
                None => mysql_value_to_json(MySqlValue::Bytes(bytes)),
            }
        }
        (_, other) => mysql_value_to_json(other),
    }
}

fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
    match mysql_val {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => json!(s),
            Err(e) => json!(e.into_bytes()),
        },
        MySqlValue::Int(i) => json!(i),
        MySqlValue::UInt(u) => json!(u),
        MySqlValue::Float(f) => json!(f),
        MySqlValue::Double(d) => json!(d),
        MySqlValue::Date(y, m, d, h, min, s, _) => {
            json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
        }
        MySqlValue::Time(is_neg, d, h, m, s, _) => {
            let sign = if is_neg { "-" } else { "" };
            let total_hours = d * 24 + h as u32;
            json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_mysql_scheme() {
        let manager = ConnectionPoolManager::new();
        let err = MySQLProvider::connect("postgresql://localhost/db", &manager).await.err().unwrap();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(MySQLProvider::connect("not a url", &manager).await.is_err());
        assert_eq!(manager.pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_mariadb_url_shares_mysql_pool() {
        let manager = ConnectionPoolManager::new();
        let provider = MySQLProvider::connect("mariadb://app@localhost:3306/shop", &manager)
            .await
            .unwrap();
        MySQLProvider::connect("mysql://app@localhost:3306/shop", &manager)
            .await
            .unwrap();
        assert_eq!(provider.database_type(), DatabaseType::MySQL);
        assert_eq!(manager.pool_count().await, 1);
    }

    #[test]
    fn test_json_to_mysql() {
        assert_eq!(json_to_mysql(&json!(null)), MySqlValue::NULL);
        assert_eq!(json_to_mysql(&json!(true)), MySqlValue::Int(1));
        assert_eq!(json_to_mysql(&json!(u64::MAX)), MySqlValue::UInt(u64::MAX));
        assert_eq!(json_to_mysql(&json!(2.5)), MySqlValue::Double(2.5));
        assert_eq!(json_to_mysql(&json!("x")), MySqlValue::Bytes(b"x".to_vec()));
    }

    #[test]
    fn test_decimal_column_read_as_number() {
        let sum = MySqlValue::Bytes(b"4200".to_vec());
        assert_eq!(mysql_column_to_json(sum, ColumnType::MYSQL_TYPE_NEWDECIMAL), json!(4200));

        let avg = MySqlValue::Bytes(b"1566.6667".to_vec());
        assert_eq!(mysql_column_to_json(avg, ColumnType::MYSQL_TYPE_NEWDECIMAL), json!(1566.6667));

        // Text columns holding digits stay text
        let code = MySqlValue::Bytes(b"0042".to_vec());
        assert_eq!(mysql_column_to_json(code, ColumnType::MYSQL_TYPE_VAR_STRING), json!("0042"));
    }

    #[test]
    fn test_mysql_value_to_json() {
        assert_eq!(mysql_value_to_json(MySqlValue::Bytes(b"john".to_vec())), json!("john"));
        assert_eq!(mysql_value_to_json(MySqlValue::Int(-3)), json!(-3));
        assert_eq!(
            mysql_value_to_json(MySqlValue::Date(2024, 1, 2, 3, 4, 5, 0)),
            json!("2024-01-02 03:04:05")
        );
        assert_eq!(
            mysql_value_to_json(MySqlValue::Time(true, 1, 2, 3, 4, 0)),
            json!("-26:03:04")
        );
    }
}
