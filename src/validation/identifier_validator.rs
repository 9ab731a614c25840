use regex::Regex;
use std::sync::LazyLock;

use crate::error::AppError;

/// Conservative allow-list: letters, digits and underscore, not starting with a digit
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier pattern"));

/// Longest identifier kept intact by every supported engine (PostgreSQL truncates past 63 bytes)
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validation for table names, column names and aliases
pub struct IdentifierValidator;

impl IdentifierValidator {
    pub fn is_valid(ident: &str) -> bool {
        ident.len() <= MAX_IDENTIFIER_LENGTH && IDENTIFIER_PATTERN.is_match(ident)
    }

    /// Validate one identifier; `kind` names it in the error ("table", "column", "alias")
    pub fn validate(kind: &str, ident: &str) -> Result<(), AppError> {
        if ident.is_empty() {
            return Err(AppError::Validation(format!("Empty {} name", kind)));
        }

        if ident.len() > MAX_IDENTIFIER_LENGTH {
            return Err(AppError::Validation(format!(
                "Invalid {} name '{}': longer than {} characters",
                kind, ident, MAX_IDENTIFIER_LENGTH
            )));
        }

        if !IDENTIFIER_PATTERN.is_match(ident) {
            return Err(AppError::Validation(format!(
                "Invalid {} name '{}': only letters, digits and underscores are allowed, and it must not start with a digit",
                kind, ident
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(IdentifierValidator::is_valid("users"));
        assert!(IdentifierValidator::is_valid("_private"));
        assert!(IdentifierValidator::is_valid("user_name2"));
        assert!(IdentifierValidator::is_valid("userName"));
    }

    #[test]
    fn test_rejects_injection_attempts() {
        assert!(IdentifierValidator::validate("table", "1table").is_err());
        assert!(IdentifierValidator::validate("table", "table; DROP").is_err());
        assert!(IdentifierValidator::validate("column", "name\"--").is_err());
        assert!(IdentifierValidator::validate("column", "a.b").is_err());
        assert!(IdentifierValidator::validate("column", "*").is_err());
        assert!(IdentifierValidator::validate("alias", "").is_err());
    }

    #[test]
    fn test_rejects_overlong_identifier() {
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let err = IdentifierValidator::validate("column", &long).unwrap_err();
        assert!(err.to_string().contains("longer than"));
        assert!(IdentifierValidator::is_valid(&"a".repeat(MAX_IDENTIFIER_LENGTH)));
    }

    #[test]
    fn test_postgres_length_limit() {
        assert!(IdentifierValidator::is_valid(&"c".repeat(63)));
        assert!(!IdentifierValidator::is_valid(&"c".repeat(64)));
    }

    #[test]
    fn test_error_names_kind() {
        let err = IdentifierValidator::validate("table", "1table").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("table name '1table'")));
    }
}
