// Conflict Detector
//
// Flags bare fields of a joined query whose storage column is declared by more
// than one source. Advisory only: the compiled statement is unchanged and the
// primary source wins, then joins in declaration order.

use serde::Serialize;
use std::fmt;

use crate::models::FieldReference;
use crate::services::field_resolver::{ResolvedQuery, SourceAssignment};
use crate::services::warning_sink::WarningSink;

/// An ambiguous bare field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictWarning {
    /// Application field name as seen by the first source declaring the column
    pub field: String,
    /// Storage column shared by the sources
    pub column: String,
    /// Sources declaring the column, primary first
    pub sources: Vec<String>,
    /// Qualified spellings that remove the ambiguity, one per source
    pub suggestions: Vec<String>,
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ambiguous field '{}' (column '{}') exists in {}; qualify it as {}",
            self.field,
            self.column,
            self.sources.join(", "),
            self.suggestions.join(" or ")
        )
    }
}

pub struct ConflictDetector;

impl ConflictDetector {
    /// Scan selected, ordered and grouped fields of a resolved query
    pub fn detect(resolved: &ResolvedQuery) -> Vec<ConflictWarning> {
        let assignment = &resolved.assignment;
        if assignment.joins.is_empty() {
            return Vec::new();
        }

        let query = &resolved.query;
        let candidates = query
            .fields
            .iter()
            .chain(query.order_by.iter().map(|order| &order.field))
            .chain(query.group_by.iter())
            .filter(|field| !field.is_qualified());

        let mut warnings: Vec<ConflictWarning> = Vec::new();
        for field in candidates {
            if warnings.iter().any(|warning| warning.column == field.field) {
                continue;
            }
            if let Some(warning) = Self::check(field, assignment) {
                warnings.push(warning);
            }
        }
        warnings
    }

    /// Detect and hand every warning to `sink`
    pub fn report(resolved: &ResolvedQuery, sink: &dyn WarningSink) -> Vec<ConflictWarning> {
        let warnings = Self::detect(resolved);
        for warning in &warnings {
            sink.emit(&warning.to_string(), warning);
        }
        warnings
    }

    fn check(field: &FieldReference, assignment: &SourceAssignment) -> Option<ConflictWarning> {
        let column = field.field.as_str();

        let primary = std::iter::once((assignment.primary_name.as_str(), assignment.primary.as_ref()));
        let joins = assignment
            .joins
            .iter()
            .map(|join| (join.label.as_str(), join.mapper.as_ref()));

        let owners: Vec<_> = primary.chain(joins).filter(|(_, mapper)| mapper.knows_column(column)).collect();
        if owners.len() < 2 {
            return None;
        }

        Some(ConflictWarning {
            field: owners[0].1.to_app_name(column).to_string(),
            column: column.to_string(),
            sources: owners.iter().map(|(label, _)| label.to_string()).collect(),
            suggestions: owners
                .iter()
                .map(|(label, mapper)| format!("{}.{}", label, mapper.to_app_name(column)))
                .collect(),
        })
    }
}
