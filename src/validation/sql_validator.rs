use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect as ParserDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::error::AppError;
use crate::models::{DatabaseType, Operation, PreparedStatement};

/// Post-compile verification: re-parses generated SQL with the matching
/// sqlparser dialect and checks it is exactly one statement of the expected kind
pub struct SqlValidator;

impl SqlValidator {
    fn parser_dialect(database_type: DatabaseType) -> Box<dyn ParserDialect> {
        match database_type {
            DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
            DatabaseType::MySQL => Box::new(MySqlDialect {}),
            DatabaseType::SQLite => Box::new(SQLiteDialect {}),
            DatabaseType::SqlServer => Box::new(MsSqlDialect {}),
        }
    }

    /// Verify a compiled statement
    pub fn verify(statement: &PreparedStatement) -> Result<(), AppError> {
        Self::verify_sql(&statement.sql, statement.operation, statement.database_type)
    }

    /// Verify raw SQL text against an expected operation
    pub fn verify_sql(sql: &str, expected: Operation, database_type: DatabaseType) -> Result<(), AppError> {
        let dialect = Self::parser_dialect(database_type);
        let ast = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| AppError::Validation(format!("Generated SQL does not parse: {}", e)))?;

        if ast.len() != 1 {
            return Err(AppError::Validation(format!(
                "Expected exactly one statement, found {}",
                ast.len()
            )));
        }

        let found = match &ast[0] {
            Statement::Query(_) => Operation::Select,
            Statement::Insert { .. } => Operation::Insert,
            Statement::Update { .. } => Operation::Update,
            Statement::Delete { .. } => Operation::Delete,
            other => {
                return Err(AppError::Validation(format!(
                    "Unexpected statement kind in generated SQL: {}",
                    other
                )))
            }
        };

        if found != expected {
            return Err(AppError::Validation(format!(
                "Generated SQL is a {} statement, expected {}",
                found.as_str(),
                expected.as_str()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_select() {
        assert!(SqlValidator::verify_sql(
            "SELECT \"id\" FROM \"users\" WHERE \"user_name\" = $1",
            Operation::Select,
            DatabaseType::PostgreSQL
        )
        .is_ok());

        assert!(SqlValidator::verify_sql(
            "SELECT `id` FROM `users` WHERE `user_name` = ? LIMIT 10",
            Operation::Select,
            DatabaseType::MySQL
        )
        .is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_kind() {
        let err = SqlValidator::verify_sql(
            "DELETE FROM \"users\"",
            Operation::Select,
            DatabaseType::PostgreSQL,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected SELECT"));
    }

    #[test]
    fn test_verify_rejects_multiple_statements() {
        assert!(SqlValidator::verify_sql(
            "SELECT 1; DROP TABLE users",
            Operation::Select,
            DatabaseType::PostgreSQL
        )
        .is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(SqlValidator::verify_sql("SELEC FROM", Operation::Select, DatabaseType::SQLite).is_err());
    }
}
