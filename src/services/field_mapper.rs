// Field Mapper
//
// Bidirectional translation between application field names and storage
// column names for one logical source. Built once at registration time and
// read-only afterwards, so a single instance is shared across concurrent calls.

use heck::ToSnakeCase;
use std::collections::HashMap;

use crate::error::AppError;
use crate::models::{Entity, Row};
use crate::validation::IdentifierValidator;

#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    /// Declared (field, column) pairs in registration order
    pairs: Vec<(String, String)>,
    to_storage: HashMap<String, String>,
    to_app: HashMap<String, String>,
}

impl FieldMapper {
    /// Build a mapper from explicit (application field, storage column) pairs
    ///
    /// The mapping must be one-to-one: a field may not map to two columns and
    /// two fields may not share a column. Columns must be valid identifiers.
    pub fn new<I, F, C>(pairs: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (F, C)>,
        F: Into<String>,
        C: Into<String>,
    {
        let mut mapper = Self::default();

        for (field, column) in pairs {
            let field = field.into();
            let column = column.into();
            IdentifierValidator::validate("column", &column)?;

            match mapper.to_storage.get(&field) {
                Some(existing) if existing == &column => continue,
                Some(existing) => {
                    return Err(AppError::Mapping(format!(
                        "Field '{}' is mapped to both '{}' and '{}'",
                        field, existing, column
                    )))
                }
                None => {}
            }
            if let Some(owner) = mapper.to_app.get(&column) {
                return Err(AppError::Mapping(format!(
                    "Column '{}' is claimed by both '{}' and '{}'",
                    column, owner, field
                )));
            }

            mapper.to_storage.insert(field.clone(), column.clone());
            mapper.to_app.insert(column.clone(), field.clone());
            mapper.pairs.push((field, column));
        }

        Ok(mapper)
    }

    /// Mapper that declares no fields; every name passes through unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    /// Declare `fields` with snake_case columns (`userName` -> `user_name`)
    pub fn snake_case<I, F>(fields: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self::new(fields.into_iter().map(|field| {
            let field = field.into();
            let column = field.to_snake_case();
            (field, column)
        }))
    }

    /// Storage column for an application field; unknown fields pass through
    pub fn to_storage_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.to_storage.get(field).map(String::as_str).unwrap_or(field)
    }

    /// Application field for a storage column; unknown columns pass through
    pub fn to_app_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.to_app.get(column).map(String::as_str).unwrap_or(column)
    }

    pub fn knows_field(&self, field: &str) -> bool {
        self.to_storage.contains_key(field)
    }

    pub fn knows_column(&self, column: &str) -> bool {
        self.to_app.contains_key(column)
    }

    /// Declared storage columns in registration order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(_, column)| column.as_str())
    }

    /// Declared application fields in registration order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(field, _)| field.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rename every column of a raw row to its application field
    pub fn row_to_entity(&self, row: &Row) -> Entity {
        row.iter()
            .map(|(column, value)| (self.to_app_name(column).to_string(), value.clone()))
            .collect()
    }

    /// Rename every field of a (partial) entity to its storage column
    pub fn entity_to_row(&self, entity: &Entity) -> Row {
        entity
            .iter()
            .map(|(field, value)| (self.to_storage_name(field).to_string(), value.clone()))
            .collect()
    }
}
