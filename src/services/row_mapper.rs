// Result Row Mapper
//
// Rebuilds application entities from raw provider rows using the mapper
// assignment produced during resolution. Primary fields land at the top
// level, joined fields under `<source>.<field>`, unattributed columns keep
// their raw name.

use crate::models::{Entity, Row};
use crate::services::field_resolver::SourceAssignment;

pub struct RowMapper;

impl RowMapper {
    pub fn map_rows(rows: &[Row], assignment: &SourceAssignment) -> Vec<Entity> {
        rows.iter().map(|row| Self::map_row(row, assignment)).collect()
    }

    pub fn map_row(row: &Row, assignment: &SourceAssignment) -> Entity {
        let mut entity = Entity::new();
        for (column, value) in row {
            let key = Self::entity_key(column, assignment);
            // First occurrence wins, matching resolution order
            entity.entry(key).or_insert_with(|| value.clone());
        }
        entity
    }

    /// Entity key for one result column
    ///
    /// Drivers return joined columns either bare or prefixed with the
    /// storage table; both are accepted.
    fn entity_key(column: &str, assignment: &SourceAssignment) -> String {
        if let Some((table, name)) = column.split_once('.') {
            if table == assignment.primary_table || table == assignment.primary_name {
                return assignment.primary.to_app_name(name).to_string();
            }
            let join = assignment
                .join_by_table(table)
                .or_else(|| assignment.join_by_source(table));
            return match join {
                Some(join) => format!("{}.{}", join.label, join.mapper.to_app_name(name)),
                None => column.to_string(),
            };
        }

        if assignment.primary.knows_column(column) {
            return assignment.primary.to_app_name(column).to_string();
        }
        match assignment.joins.iter().find(|join| join.mapper.knows_column(column)) {
            Some(join) => format!("{}.{}", join.label, join.mapper.to_app_name(column)),
            None => column.to_string(),
        }
    }
}
