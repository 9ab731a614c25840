// SQLite provider backed by a single rusqlite connection
use rusqlite::types::Value as SqliteValue;
use rusqlite::{params_from_iter, Connection, InterruptHandle};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{DatabaseType, Operation, PreparedStatement, Row, RowSet};
use crate::services::database::provider::{timeout_error, Provider, DEFAULT_STATEMENT_TIMEOUT};

/// SQLite provider
/// Uses tokio::Mutex for async-friendly locking; statements run on the
/// blocking pool and are interrupted when they outlive the timeout
pub struct SqliteProvider {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    timeout: Duration,
}

impl SqliteProvider {
    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open from a URL: `sqlite::memory:`, `:memory:`, `sqlite:./path` or `sqlite://path`
    pub fn from_url(url: &str) -> Result<Self, AppError> {
        let path = url.trim_start_matches("sqlite:").trim_start_matches("//");
        if path.is_empty() {
            return Err(AppError::Configuration(format!("Invalid SQLite URL: '{}'", url)));
        }
        if path == ":memory:" || path == "memory:" {
            return Self::open_in_memory();
        }
        Self::open(path)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        // Enable foreign key constraints
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
            timeout: DEFAULT_STATEMENT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run raw DDL or setup SQL outside the compiled-statement path
    pub async fn execute_batch(&self, sql: &str) -> Result<(), AppError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn run(conn: &Connection, statement: &PreparedStatement) -> Result<RowSet, AppError> {
        let start_time = Instant::now();
        let params: Vec<SqliteValue> = statement.params.iter().map(json_to_sqlite).collect();

        if statement.returns_rows() {
            let mut stmt = conn.prepare(&statement.sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;

            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let mut row_obj = Row::new();
                for (idx, column) in columns.iter().enumerate() {
                    let value: SqliteValue = row.get(idx)?;
                    // Duplicate column names keep the first occurrence
                    if !row_obj.contains_key(column) {
                        row_obj.insert(column.clone(), sqlite_to_json(value));
                    }
                }
                result.push(row_obj);
            }

            return Ok(RowSet::from_rows(result, start_time.elapsed().as_millis() as u64));
        }

        let affected = conn.execute(&statement.sql, params_from_iter(params.iter()))?;
        let last_insert_id = match statement.operation {
            Operation::Insert => u64::try_from(conn.last_insert_rowid()).ok(),
            _ => None,
        };

        Ok(RowSet::from_write(
            affected as u64,
            last_insert_id,
            start_time.elapsed().as_millis() as u64,
        ))
    }
}

#[async_trait::async_trait]
impl Provider for SqliteProvider {
    async fn execute(&self, statement: &PreparedStatement) -> Result<RowSet, AppError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let conn = tokio::time::timeout_at(deadline, self.conn.clone().lock_owned())
            .await
            .map_err(|_| timeout_error(self.timeout))?;

        let owned = statement.clone();
        let task = tokio::task::spawn_blocking(move || Self::run(&conn, &owned));

        let result = match tokio::time::timeout_at(deadline, task).await {
            Ok(joined) => joined.map_err(|e| AppError::Internal(format!("SQLite task failed: {}", e)))?,
            Err(_) => {
                // The lock is still ours, so only this statement is interrupted
                self.interrupt.interrupt();
                return Err(timeout_error(self.timeout));
            }
        };

        result.map_err(|e| {
            tracing::error!("SQLite statement failed: {}", e);
            e
        })
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

/// JSON parameter to SQLite storage class; arrays and objects become JSON text
fn json_to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqliteValue::Integer(i),
            None => SqliteValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqliteValue::Text(s.clone()),
        other => SqliteValue::Text(other.to_string()),
    }
}

fn sqlite_to_json(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => json!(i),
        SqliteValue::Real(f) => json!(f),
        SqliteValue::Text(s) => Value::String(s),
        SqliteValue::Blob(bytes) => json!(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn statement(sql: &str, params: Vec<Value>, operation: Operation) -> PreparedStatement {
        PreparedStatement {
            sql: sql.to_string(),
            params,
            operation,
            database_type: DatabaseType::SQLite,
        }
    }

    async fn provider() -> SqliteProvider {
        let provider = SqliteProvider::open_in_memory().unwrap();
        provider
            .execute_batch(
                "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, active INTEGER, tags TEXT)",
            )
            .await
            .unwrap();
        provider
    }

    #[tokio::test]
    async fn test_insert_then_select() {
        let provider = provider().await;

        let insert = statement(
            "INSERT INTO items (name, price, active, tags) VALUES (?1, ?2, ?3, ?4)",
            vec![json!("pen"), json!(1.5), json!(true), json!(["blue", "ink"])],
            Operation::Insert,
        );
        let outcome = assert_ok!(provider.execute(&insert).await);
        assert_eq!(outcome.affected_rows, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let select = statement(
            "SELECT id, name, price, active, tags FROM items WHERE name = ?1",
            vec![json!("pen")],
            Operation::Select,
        );
        let result = assert_ok!(provider.execute(&select).await);
        assert_eq!(result.row_count(), 1);

        let row = &result.rows[0];
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["price"], json!(1.5));
        assert_eq!(row["active"], json!(1));
        assert_eq!(row["tags"], json!(r#"["blue","ink"]"#));
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["id", "name", "price", "active", "tags"]);
    }

    #[tokio::test]
    async fn test_update_reports_affected_rows() {
        let provider = provider().await;
        provider
            .execute_batch("INSERT INTO items (name) VALUES ('a'), ('b'), ('c')")
            .await
            .unwrap();

        let update = statement(
            "UPDATE items SET price = ?1 WHERE name <> ?2",
            vec![json!(2), json!("a")],
            Operation::Update,
        );
        let outcome = assert_ok!(provider.execute(&update).await);
        assert_eq!(outcome.affected_rows, 2);
        assert_eq!(outcome.last_insert_id, None);
    }

    #[tokio::test]
    async fn test_null_parameter_round_trip() {
        let provider = provider().await;
        let insert = statement("INSERT INTO items (name) VALUES (?1)", vec![Value::Null], Operation::Insert);
        assert_ok!(provider.execute(&insert).await);

        let select = statement("SELECT name FROM items", vec![], Operation::Select);
        let result = provider.execute(&select).await.unwrap();
        assert_eq!(result.rows[0]["name"], Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_sql_is_database_error() {
        let provider = provider().await;
        let err = assert_err!(
            provider
                .execute(&statement("SELECT * FROM missing", vec![], Operation::Select))
                .await
        );
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_test_connection() {
        let provider = SqliteProvider::from_url("sqlite::memory:").unwrap();
        assert_ok!(provider.test_connection().await);
        assert_eq!(provider.database_type(), DatabaseType::SQLite);
    }

    #[tokio::test]
    async fn test_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapper.db");
        let url = format!("sqlite://{}", path.display());

        {
            let provider = SqliteProvider::from_url(&url).unwrap();
            provider.execute_batch("CREATE TABLE t (id INTEGER)").await.unwrap();
            provider.execute_batch("INSERT INTO t VALUES (7)").await.unwrap();
        }

        let reopened = SqliteProvider::open(&path).unwrap();
        let result = reopened
            .execute(&statement("SELECT id FROM t", vec![], Operation::Select))
            .await
            .unwrap();
        assert_eq!(result.rows[0]["id"], json!(7));
    }

    #[tokio::test]
    async fn test_runaway_statement_interrupted_at_timeout() {
        let provider = SqliteProvider::open_in_memory()
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let endless = statement(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT COUNT(*) FROM n",
            vec![],
            Operation::Select,
        );

        let err = assert_err!(provider.execute(&endless).await);
        assert!(err.to_string().contains("timeout"));

        // The connection is released once the interrupted statement unwinds
        let result = assert_ok!(
            provider
                .execute(&statement("SELECT 1 AS one", vec![], Operation::Select))
                .await
        );
        assert_eq!(result.rows[0]["one"], json!(1));
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(
            SqliteProvider::from_url("sqlite:"),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_json_to_sqlite_conversion() {
        assert_eq!(json_to_sqlite(&json!(false)), SqliteValue::Integer(0));
        assert_eq!(json_to_sqlite(&json!(42)), SqliteValue::Integer(42));
        assert_eq!(json_to_sqlite(&json!(0.25)), SqliteValue::Real(0.25));
        assert_eq!(
            json_to_sqlite(&json!({"a": 1})),
            SqliteValue::Text(r#"{"a":1}"#.to_string())
        );
    }
}
