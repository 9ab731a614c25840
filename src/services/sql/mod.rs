pub mod compiler;
pub mod dialect;

pub use compiler::StatementCompiler;
pub use dialect::{Dialect, MySQLDialect, PostgreSQLDialect, SQLiteDialect, SqlFeature, SqlServerDialect};
