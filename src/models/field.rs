// Field Reference Model
//
// A field name, optionally qualified by a storage table or a logical source.
// References are written in application field names and rewritten into
// storage column names by the field resolver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a field reference is qualified by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Qualifier {
    /// Storage table name
    Table(String),
    /// Logical source (repository) name
    Source(String),
    /// Qualifier taken from a dotted `a.b` string; its kind is decided
    /// during resolution
    Name(String),
}

impl Qualifier {
    pub fn name(&self) -> &str {
        match self {
            Qualifier::Table(name) | Qualifier::Source(name) | Qualifier::Name(name) => name,
        }
    }
}

/// A possibly-qualified field name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Qualifier>,
    pub field: String,
}

impl FieldReference {
    /// Unqualified reference, belongs to the primary source
    pub fn bare(field: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            field: field.into(),
        }
    }

    /// Reference qualified by a storage table name
    pub fn table(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            qualifier: Some(Qualifier::Table(table.into())),
            field: field.into(),
        }
    }

    /// Reference qualified by a logical source name
    pub fn source(source: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            qualifier: Some(Qualifier::Source(source.into())),
            field: field.into(),
        }
    }

    /// Parse `field` or `qualifier.field`
    ///
    /// Only the first dot splits; a string with an empty half is kept as a
    /// bare name and left for identifier validation to reject.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('.') {
            Some((qualifier, field)) if !qualifier.is_empty() && !field.is_empty() => Self {
                qualifier: Some(Qualifier::Name(qualifier.to_string())),
                field: field.to_string(),
            },
            _ => Self::bare(raw),
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }

    pub fn qualifier_name(&self) -> Option<&str> {
        self.qualifier.as_ref().map(Qualifier::name)
    }

    /// Same qualifier, different field part
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        Self {
            qualifier: self.qualifier.clone(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}.{}", qualifier.name(), self.field),
            None => write!(f, "{}", self.field),
        }
    }
}

impl From<&str> for FieldReference {
    fn from(raw: &str) -> Self {
        FieldReference::parse(raw)
    }
}

impl From<String> for FieldReference {
    fn from(raw: String) -> Self {
        FieldReference::parse(&raw)
    }
}

/// Logical source or storage table a query or join reads from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum SourceRef {
    Table(String),
    Source(String),
}

impl SourceRef {
    pub fn name(&self) -> &str {
        match self {
            SourceRef::Table(name) | SourceRef::Source(name) => name,
        }
    }
}
