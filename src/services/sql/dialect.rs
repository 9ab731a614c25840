// SQL Dialects
//
// Identifier quoting, placeholder style and pagination for each supported
// database. The statement compiler is written against the Dialect trait and
// never hard-codes a quoting convention.

use std::sync::Arc;

use crate::models::DatabaseType;

/// SQL features that may differ across dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFeature {
    /// FULL OUTER JOIN
    FullOuterJoin,
    /// RIGHT JOIN
    RightJoin,
}

/// Dialect-specific rendering rules
pub trait Dialect: Send + Sync {
    /// Get the name of this dialect (e.g., "PostgreSQL", "MySQL")
    fn dialect_name(&self) -> &str;

    fn database_type(&self) -> DatabaseType;

    /// Quote a single identifier. Never pass a dotted `table.field` here.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a `table.field` pair: each part quoted on its own, joined by a dot
    fn quote_qualified(&self, table: &str, field: &str) -> String {
        format!("{}.{}", self.quote_identifier(table), self.quote_identifier(field))
    }

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// Check if a specific SQL feature is supported in this dialect
    fn supports_feature(&self, feature: SqlFeature) -> bool;

    /// Append LIMIT/OFFSET in this dialect's syntax
    fn write_pagination(&self, sql: &mut String, limit: Option<u64>, offset: Option<u64>, has_order_by: bool) {
        let _ = has_order_by;
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
    }
}

fn wrap(ident: &str, open: char, close: char) -> String {
    let mut quoted = String::with_capacity(ident.len() + 2);
    quoted.push(open);
    for ch in ident.chars() {
        if ch == close {
            quoted.push(close);
        }
        quoted.push(ch);
    }
    quoted.push(close);
    quoted
}

/// PostgreSQL: `"ident"`, `$n`
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgreSQLDialect;

impl Dialect for PostgreSQLDialect {
    fn dialect_name(&self) -> &str {
        "PostgreSQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn quote_identifier(&self, ident: &str) -> String {
        wrap(ident, '"', '"')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn supports_feature(&self, feature: SqlFeature) -> bool {
        match feature {
            SqlFeature::FullOuterJoin => true,
            SqlFeature::RightJoin => true,
        }
    }
}

/// MySQL: `` `ident` ``, `?`
#[derive(Debug, Default, Clone, Copy)]
pub struct MySQLDialect;

impl Dialect for MySQLDialect {
    fn dialect_name(&self) -> &str {
        "MySQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn quote_identifier(&self, ident: &str) -> String {
        wrap(ident, '`', '`')
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn supports_feature(&self, feature: SqlFeature) -> bool {
        match feature {
            SqlFeature::FullOuterJoin => false,
            SqlFeature::RightJoin => true,
        }
    }

    fn write_pagination(&self, sql: &mut String, limit: Option<u64>, offset: Option<u64>, _has_order_by: bool) {
        // MySQL has no OFFSET without LIMIT
        match (limit, offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(_)) => sql.push_str(&format!(" LIMIT {}", u64::MAX)),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
    }
}

/// SQLite: `"ident"`, `?n`
#[derive(Debug, Default, Clone, Copy)]
pub struct SQLiteDialect;

impl Dialect for SQLiteDialect {
    fn dialect_name(&self) -> &str {
        "SQLite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn quote_identifier(&self, ident: &str) -> String {
        wrap(ident, '"', '"')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn supports_feature(&self, feature: SqlFeature) -> bool {
        match feature {
            // Since SQLite 3.39
            SqlFeature::FullOuterJoin => true,
            SqlFeature::RightJoin => true,
        }
    }

    fn write_pagination(&self, sql: &mut String, limit: Option<u64>, offset: Option<u64>, _has_order_by: bool) {
        match (limit, offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
    }
}

/// SQL Server: `[ident]`, `@pn`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn dialect_name(&self) -> &str {
        "SQL Server"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn quote_identifier(&self, ident: &str) -> String {
        wrap(ident, '[', ']')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn supports_feature(&self, feature: SqlFeature) -> bool {
        match feature {
            SqlFeature::FullOuterJoin => true,
            SqlFeature::RightJoin => true,
        }
    }

    fn write_pagination(&self, sql: &mut String, limit: Option<u64>, offset: Option<u64>, has_order_by: bool) {
        if limit.is_none() && offset.is_none() {
            return;
        }
        // OFFSET/FETCH is only valid after ORDER BY
        if !has_order_by {
            sql.push_str(" ORDER BY (SELECT NULL)");
        }
        sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
        if let Some(limit) = limit {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
        }
    }
}

impl DatabaseType {
    /// Built-in dialect for this database type
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        match self {
            DatabaseType::PostgreSQL => Arc::new(PostgreSQLDialect),
            DatabaseType::MySQL => Arc::new(MySQLDialect),
            DatabaseType::SQLite => Arc::new(SQLiteDialect),
            DatabaseType::SqlServer => Arc::new(SqlServerDialect),
        }
    }
}
