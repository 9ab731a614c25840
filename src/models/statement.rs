// Prepared Statement and Row Set Models
//
// A PreparedStatement is produced fresh per compile call: dialect-specific SQL
// text plus the ordered parameter list. A RowSet is what a provider hands back
// after executing one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::query::Operation;

/// Raw result row as returned by a provider: column name to value
pub type Row = Map<String, Value>;

/// Database type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// PostgreSQL database
    PostgreSQL,
    /// MySQL / MariaDB database
    MySQL,
    /// SQLite database
    SQLite,
    /// Microsoft SQL Server database
    SqlServer,
}

impl DatabaseType {
    /// Get the string representation of the database type
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
            DatabaseType::SQLite => "sqlite",
            DatabaseType::SqlServer => "sqlserver",
        }
    }

    /// Parse database type from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(DatabaseType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseType::MySQL),
            "sqlite" | "sqlite3" => Ok(DatabaseType::SQLite),
            "sqlserver" | "mssql" => Ok(DatabaseType::SqlServer),
            _ => Err(format!("Unsupported database type: {}", s)),
        }
    }
}

/// Compiled, parameterized statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedStatement {
    /// SQL text with positional placeholders, free of literal values
    pub sql: String,
    /// Parameters in placeholder order
    pub params: Vec<Value>,
    pub operation: Operation,
    pub database_type: DatabaseType,
}

impl PreparedStatement {
    /// Whether executing this statement yields rows
    pub fn returns_rows(&self) -> bool {
        self.operation == Operation::Select
    }
}

/// Provider execution result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub rows: Vec<Row>,
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
    pub execution_time_ms: u64,
}

impl RowSet {
    pub fn from_rows(rows: Vec<Row>, execution_time_ms: u64) -> Self {
        Self {
            rows,
            affected_rows: 0,
            last_insert_id: None,
            execution_time_ms,
        }
    }

    pub fn from_write(affected_rows: u64, last_insert_id: Option<u64>, execution_time_ms: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows,
            last_insert_id,
            execution_time_ms,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_str_conversion() {
        assert_eq!(DatabaseType::PostgreSQL.as_str(), "postgresql");
        assert_eq!(DatabaseType::MySQL.as_str(), "mysql");
        assert_eq!(DatabaseType::SQLite.as_str(), "sqlite");
        assert_eq!(DatabaseType::SqlServer.as_str(), "sqlserver");
    }

    #[test]
    fn test_database_type_parsing() {
        assert_eq!(DatabaseType::from_str("postgres").unwrap(), DatabaseType::PostgreSQL);
        assert_eq!(DatabaseType::from_str("MariaDB").unwrap(), DatabaseType::MySQL);
        assert_eq!(DatabaseType::from_str("sqlite3").unwrap(), DatabaseType::SQLite);
        assert_eq!(DatabaseType::from_str("mssql").unwrap(), DatabaseType::SqlServer);
        assert!(DatabaseType::from_str("oracle").is_err());
    }

    #[test]
    fn test_returns_rows() {
        let statement = PreparedStatement {
            sql: "DELETE FROM \"users\"".to_string(),
            params: vec![],
            operation: Operation::Delete,
            database_type: DatabaseType::PostgreSQL,
        };
        assert!(!statement.returns_rows());
    }

    #[test]
    fn test_row_set_constructors() {
        let write = RowSet::from_write(3, Some(7), 2);
        assert_eq!(write.affected_rows, 3);
        assert_eq!(write.last_insert_id, Some(7));
        assert_eq!(write.row_count(), 0);
    }
}
