pub mod condition;
pub mod field;
pub mod query;
pub mod statement;

pub use condition::*;
pub use field::*;
pub use query::*;
pub use statement::*;
