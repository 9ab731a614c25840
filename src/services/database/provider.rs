// Provider trait for statement execution
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Number, Value};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{DatabaseType, PreparedStatement, RowSet};

/// Per-statement timeout used when none is configured
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes compiled statements against one database
///
/// The repository hands every statement to exactly one `execute` call and
/// holds no lock while awaiting it. Timeouts and connection limits are the
/// provider's business.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Run a statement: rows for SELECT, affected-row metadata for writes
    async fn execute(&self, statement: &PreparedStatement) -> Result<RowSet, AppError>;

    /// Get database type
    fn database_type(&self) -> DatabaseType;

    /// Test connection
    async fn test_connection(&self) -> Result<(), AppError>;
}

pub(crate) fn timeout_error(timeout: Duration) -> AppError {
    AppError::Database(format!("Statement timeout after {} ms", timeout.as_millis()))
}

/// Decimals leave every provider as JSON numbers: integers when whole,
/// floats otherwise, text only when no f64 can hold them
pub(crate) fn decimal_to_json(value: Decimal) -> Value {
    let value = value.normalize();
    if value.fract().is_zero() {
        if let Some(i) = value.to_i64() {
            return json!(i);
        }
    }
    value
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

/// Decimal from a JSON number or numeric string
pub(crate) fn json_to_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_to_json() {
        assert_eq!(decimal_to_json(Decimal::from_str("4200.00").unwrap()), json!(4200));
        assert_eq!(decimal_to_json(Decimal::from_str("1566.6666").unwrap()), json!(1566.6666));
        assert_eq!(decimal_to_json(Decimal::from_str("-3").unwrap()), json!(-3));
    }

    #[test]
    fn test_json_to_decimal() {
        assert_eq!(json_to_decimal(&json!(12)), Some(Decimal::from(12)));
        assert_eq!(json_to_decimal(&json!("19.99")), Decimal::from_str("19.99").ok());
        assert_eq!(json_to_decimal(&json!(2.5)), Decimal::from_str("2.5").ok());
        assert_eq!(json_to_decimal(&json!(1e20)), Decimal::from_str("100000000000000000000").ok());
        assert_eq!(json_to_decimal(&json!("abc")), None);
        assert_eq!(json_to_decimal(&json!(true)), None);
    }
}
