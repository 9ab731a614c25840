pub mod conflict_detector;
pub mod connection_pool;
pub mod database; // Statement execution providers
pub mod field_mapper;
pub mod field_resolver;
pub mod repository;
pub mod row_mapper;
pub mod source_directory;
pub mod sql; // Dialects and statement compiler
pub mod warning_sink;

pub use conflict_detector::*;
pub use connection_pool::*;
pub use field_mapper::*;
pub use field_resolver::*;
pub use repository::*;
pub use row_mapper::*;
pub use source_directory::*;
pub use sql::{Dialect, SqlFeature, StatementCompiler};
pub use warning_sink::*;
