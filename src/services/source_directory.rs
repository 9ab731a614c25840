// Source Directory
//
// Resolves a logical source name to its storage table and FieldMapper.
// SourceRegistry is the in-process implementation: populated at configuration
// time, then shared read-only behind an Arc.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;
use crate::services::field_mapper::FieldMapper;
use crate::validation::IdentifierValidator;

/// A registered logical source
#[derive(Debug, Clone)]
pub struct SourceBinding {
    pub name: String,
    pub table: String,
    pub mapper: Arc<FieldMapper>,
}

/// Lookup of logical sources
pub trait SourceDirectory: Send + Sync {
    /// Resolve a logical source name; fails when the name is unregistered
    fn resolve(&self, name: &str) -> Result<SourceBinding, AppError>;

    /// Reverse lookup by storage table, if the directory supports it
    fn find_by_table(&self, _table: &str) -> Option<SourceBinding> {
        None
    }

    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }
}

/// Registry of logical sources
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, SourceBinding>,
    by_table: HashMap<String, String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logical source backed by `table`
    ///
    /// Re-registering a name replaces the previous binding.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        mapper: FieldMapper,
    ) -> Result<Arc<FieldMapper>, AppError> {
        let name = name.into();
        let table = table.into();
        IdentifierValidator::validate("source", &name)?;
        IdentifierValidator::validate("table", &table)?;

        let mapper = Arc::new(mapper);
        tracing::debug!("Registered source '{}' on table '{}'", name, table);

        if let Some(previous) = self.sources.remove(&name) {
            self.release_table(&previous.table, &name);
        }
        self.by_table.insert(table.clone(), name.clone());
        self.sources.insert(
            name.clone(),
            SourceBinding {
                name,
                table,
                mapper: mapper.clone(),
            },
        );

        Ok(mapper)
    }

    /// Drop `owner`'s claim on `table`; another source on the same table takes it over
    fn release_table(&mut self, table: &str, owner: &str) {
        if self.by_table.get(table).map(String::as_str) != Some(owner) {
            return;
        }
        self.by_table.remove(table);
        if let Some(successor) = self
            .sources
            .values()
            .filter(|binding| binding.table == table)
            .map(|binding| binding.name.as_str())
            .min()
        {
            self.by_table.insert(table.to_string(), successor.to_string());
        }
    }

    /// Builder-style registration
    pub fn with_source(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        mapper: FieldMapper,
    ) -> Result<Self, AppError> {
        self.register(name, table, mapper)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Registered source names, sorted
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SourceDirectory for SourceRegistry {
    fn resolve(&self, name: &str) -> Result<SourceBinding, AppError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::Mapping(format!("Unknown source '{}'", name)))
    }

    fn find_by_table(&self, table: &str) -> Option<SourceBinding> {
        self.by_table
            .get(table)
            .and_then(|name| self.sources.get(name))
            .cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }
}
