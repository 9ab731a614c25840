pub mod identifier_validator;
pub mod query_validator;
pub mod sql_validator;

pub use identifier_validator::IdentifierValidator;
pub use query_validator::QueryValidator;
pub use sql_validator::SqlValidator;
