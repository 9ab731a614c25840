// Query Shape and Identifier Validation
//
// Runs before any SQL text is produced. A query that fails here never reaches
// the compiler's output buffer.

use std::collections::BTreeSet;

use crate::error::AppError;
use crate::models::{
    Aggregate, AggregateFunction, Condition, FieldReference, JoinType, MemberSet, Operand, Operation, Query,
};
use crate::services::sql::dialect::{Dialect, SqlFeature};

use super::identifier_validator::IdentifierValidator;

pub struct QueryValidator;

impl QueryValidator {
    /// Validate structure and every identifier of `query` for `dialect`
    pub fn validate(query: &Query, dialect: &dyn Dialect) -> Result<(), AppError> {
        Self::validate_shape(query)?;
        Self::validate_identifiers(query)?;
        Self::validate_features(query, dialect)
    }

    /// Structural rules that depend only on the operation
    pub fn validate_shape(query: &Query) -> Result<(), AppError> {
        let op = query.operation.as_str();
        let reject = |what: &str| Err(AppError::Validation(format!("{} is not allowed on {}", what, op)));

        match query.operation {
            Operation::Select => {
                if query.values.is_some() {
                    return reject("values");
                }
            }
            Operation::Insert => {
                if query.filter.is_some() {
                    return reject("where");
                }
                if query.limit.is_some() || query.offset.is_some() {
                    return reject("limit/offset");
                }
                if !query.order_by.is_empty() {
                    return reject("order by");
                }
                Self::validate_write_only(query)?;
                let rows = Self::require_values(query)?;
                let keys: BTreeSet<&String> = rows[0].keys().collect();
                if rows.iter().any(|row| row.keys().collect::<BTreeSet<_>>() != keys) {
                    return Err(AppError::Validation(
                        "All INSERT rows must provide the same fields".to_string(),
                    ));
                }
            }
            Operation::Update => {
                if query.limit.is_some() || query.offset.is_some() {
                    return reject("limit/offset");
                }
                if !query.order_by.is_empty() {
                    return reject("order by");
                }
                Self::validate_write_only(query)?;
                let rows = Self::require_values(query)?;
                if rows.len() != 1 {
                    return Err(AppError::Validation(format!(
                        "UPDATE takes exactly one assignment row, got {}",
                        rows.len()
                    )));
                }
            }
            Operation::Delete => {
                if query.values.is_some() {
                    return reject("values");
                }
                if query.limit.is_some() || query.offset.is_some() {
                    return reject("limit/offset");
                }
                if !query.order_by.is_empty() {
                    return reject("order by");
                }
                Self::validate_write_only(query)?;
            }
        }

        let mut tables = BTreeSet::from([query.from.name()]);
        for join in &query.joins {
            if !tables.insert(join.target.name()) {
                return Err(AppError::Validation(format!(
                    "Table '{}' appears more than once; table aliases are not supported",
                    join.target.name()
                )));
            }
        }

        for aggregate in &query.aggregates {
            Self::validate_aggregate(aggregate)?;
        }
        for condition in query.filter.iter().chain(query.having.iter()) {
            Self::validate_condition_shape(condition)?;
        }
        for join in &query.joins {
            Self::validate_condition_shape(&join.on)?;
        }

        Ok(())
    }

    /// INSERT/UPDATE/DELETE never carry SELECT-only clauses
    fn validate_write_only(query: &Query) -> Result<(), AppError> {
        let op = query.operation.as_str();
        let clauses = [
            ("joins", !query.joins.is_empty()),
            ("group by", !query.group_by.is_empty()),
            ("having", query.having.is_some()),
            ("fields", !query.fields.is_empty()),
            ("aggregates", !query.aggregates.is_empty()),
        ];
        for (clause, present) in clauses {
            if present {
                return Err(AppError::Validation(format!("{} is not allowed on {}", clause, op)));
            }
        }
        Ok(())
    }

    fn require_values(query: &Query) -> Result<&[crate::models::Entity], AppError> {
        match query.values.as_deref() {
            Some(rows) if !rows.is_empty() && rows.iter().all(|row| !row.is_empty()) => Ok(rows),
            _ => Err(AppError::Validation(format!(
                "{} requires at least one non-empty values row",
                query.operation.as_str()
            ))),
        }
    }

    fn validate_aggregate(aggregate: &Aggregate) -> Result<(), AppError> {
        if aggregate.field.is_none() && aggregate.function != AggregateFunction::Count {
            return Err(AppError::Validation(format!(
                "{} requires a field; only COUNT accepts *",
                aggregate.function.as_sql()
            )));
        }
        if aggregate.field.is_none() && aggregate.distinct {
            return Err(AppError::Validation("COUNT(DISTINCT *) is not valid".to_string()));
        }
        Ok(())
    }

    fn validate_condition_shape(condition: &Condition) -> Result<(), AppError> {
        match condition {
            Condition::And(items) | Condition::Or(items) => {
                if items.is_empty() {
                    return Err(AppError::Validation("Empty AND/OR group".to_string()));
                }
                items.iter().try_for_each(Self::validate_condition_shape)
            }
            Condition::Not(inner) => Self::validate_condition_shape(inner),
            Condition::In { set, .. } => match set {
                MemberSet::List(items) if items.is_empty() => {
                    Err(AppError::Validation("IN requires at least one value".to_string()))
                }
                MemberSet::List(_) => Ok(()),
                MemberSet::Subquery(subquery) => {
                    if subquery.operation != Operation::Select {
                        return Err(AppError::Validation("IN subquery must be a SELECT".to_string()));
                    }
                    if subquery.fields.len() + subquery.aggregates.len() != 1 {
                        return Err(AppError::Validation(
                            "IN subquery must select exactly one column".to_string(),
                        ));
                    }
                    Self::validate_shape(subquery)
                }
            },
            Condition::AggregateComparison { aggregate, .. } => Self::validate_aggregate(aggregate),
            Condition::Comparison { .. } | Condition::Null { .. } | Condition::Between { .. } | Condition::Like { .. } => {
                Ok(())
            }
        }
    }

    /// Every table, column and alias name must pass the allow-list
    pub fn validate_identifiers(query: &Query) -> Result<(), AppError> {
        IdentifierValidator::validate("table", query.from.name())?;

        for field in &query.fields {
            Self::validate_field(field)?;
        }
        for aggregate in &query.aggregates {
            Self::validate_aggregate_identifiers(aggregate)?;
        }
        for field in &query.group_by {
            Self::validate_field(field)?;
        }
        for order in &query.order_by {
            Self::validate_field(&order.field)?;
        }
        for join in &query.joins {
            IdentifierValidator::validate("table", join.target.name())?;
            Self::validate_condition_identifiers(&join.on)?;
        }
        for condition in query.filter.iter().chain(query.having.iter()) {
            Self::validate_condition_identifiers(condition)?;
        }
        if let Some(rows) = &query.values {
            for column in rows.iter().flat_map(|row| row.keys()) {
                IdentifierValidator::validate("column", column)?;
            }
        }
        Ok(())
    }

    fn validate_field(field: &FieldReference) -> Result<(), AppError> {
        if let Some(qualifier) = field.qualifier_name() {
            IdentifierValidator::validate("table", qualifier)?;
        }
        IdentifierValidator::validate("column", &field.field)
    }

    fn validate_aggregate_identifiers(aggregate: &Aggregate) -> Result<(), AppError> {
        if let Some(field) = &aggregate.field {
            Self::validate_field(field)?;
        }
        if let Some(alias) = &aggregate.alias {
            IdentifierValidator::validate("alias", alias)?;
        }
        Ok(())
    }

    fn validate_operand(operand: &Operand) -> Result<(), AppError> {
        match operand {
            Operand::Field(field) => Self::validate_field(field),
            Operand::Value(_) => Ok(()),
        }
    }

    fn validate_condition_identifiers(condition: &Condition) -> Result<(), AppError> {
        match condition {
            Condition::Comparison { field, value, .. } => {
                Self::validate_field(field)?;
                Self::validate_operand(value)
            }
            Condition::In { field, set, .. } => {
                Self::validate_field(field)?;
                match set {
                    MemberSet::List(items) => items.iter().try_for_each(Self::validate_operand),
                    MemberSet::Subquery(subquery) => Self::validate_identifiers(subquery),
                }
            }
            Condition::Null { field, .. } | Condition::Between { field, .. } | Condition::Like { field, .. } => {
                Self::validate_field(field)
            }
            Condition::AggregateComparison { aggregate, value, .. } => {
                Self::validate_aggregate_identifiers(aggregate)?;
                Self::validate_operand(value)
            }
            Condition::And(items) | Condition::Or(items) => {
                items.iter().try_for_each(Self::validate_condition_identifiers)
            }
            Condition::Not(inner) => Self::validate_condition_identifiers(inner),
        }
    }

    /// Join kinds the dialect cannot express
    fn validate_features(query: &Query, dialect: &dyn Dialect) -> Result<(), AppError> {
        for join in &query.joins {
            let feature = match join.kind {
                JoinType::Full => SqlFeature::FullOuterJoin,
                JoinType::Right => SqlFeature::RightJoin,
                JoinType::Inner | JoinType::Left => continue,
            };
            if !dialect.supports_feature(feature) {
                return Err(AppError::Validation(format!(
                    "{} is not supported by {}",
                    join.kind.as_sql(),
                    dialect.dialect_name()
                )));
            }
        }

        let conditions = query
            .filter
            .iter()
            .chain(query.having.iter())
            .chain(query.joins.iter().map(|join| &join.on));
        for condition in conditions {
            Self::validate_subquery_features(condition, dialect)?;
        }
        Ok(())
    }

    fn validate_subquery_features(condition: &Condition, dialect: &dyn Dialect) -> Result<(), AppError> {
        match condition {
            Condition::In {
                set: MemberSet::Subquery(subquery),
                ..
            } => Self::validate_features(subquery, dialect),
            Condition::And(items) | Condition::Or(items) => items
                .iter()
                .try_for_each(|item| Self::validate_subquery_features(item, dialect)),
            Condition::Not(inner) => Self::validate_subquery_features(inner, dialect),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Join, OrderBy, SourceRef};
    use crate::services::sql::dialect::{MySQLDialect, PostgreSQLDialect};
    use serde_json::json;

    fn users() -> SourceRef {
        SourceRef::Table("users".into())
    }

    fn row(value: serde_json::Value) -> crate::models::Entity {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_select_with_values_rejected() {
        let query = Query::select(users()).values(row(json!({"a": 1})));
        let err = QueryValidator::validate_shape(&query).unwrap_err();
        assert!(err.to_string().contains("values is not allowed on SELECT"));
    }

    #[test]
    fn test_insert_requires_values() {
        assert!(QueryValidator::validate_shape(&Query::insert(users())).is_err());
        let empty_row = Query::insert(users()).values(row(json!({})));
        assert!(QueryValidator::validate_shape(&empty_row).is_err());
    }

    #[test]
    fn test_insert_rows_must_share_keys() {
        let query = Query::insert(users())
            .values(row(json!({"a": 1, "b": 2})))
            .values(row(json!({"a": 3})));
        assert!(QueryValidator::validate_shape(&query).is_err());

        let query = Query::insert(users())
            .values(row(json!({"a": 1, "b": 2})))
            .values(row(json!({"b": 4, "a": 3})));
        assert!(QueryValidator::validate_shape(&query).is_ok());
    }

    #[test]
    fn test_update_rejects_select_clauses() {
        let query = Query::update(users())
            .values(row(json!({"a": 1})))
            .order_by(OrderBy::asc("a"));
        assert!(QueryValidator::validate_shape(&query).is_err());

        let query = Query::update(users())
            .values(row(json!({"a": 1})))
            .join(Join::inner(SourceRef::Table("orders".into()), Condition::eq_field("id", "orders.user_id")));
        assert!(QueryValidator::validate_shape(&query).is_err());
    }

    #[test]
    fn test_delete_with_values_rejected() {
        let query = Query::delete(users()).values(row(json!({"a": 1})));
        assert!(QueryValidator::validate_shape(&query).is_err());
        assert!(QueryValidator::validate_shape(&Query::delete(users())).is_ok());
    }

    #[test]
    fn test_aggregate_star_only_for_count() {
        let mut star_sum = Aggregate::count_all();
        star_sum.function = AggregateFunction::Sum;
        let query = Query::select(users()).aggregate(star_sum);
        assert!(QueryValidator::validate_shape(&query).is_err());

        let query = Query::select(users()).aggregate(Aggregate::count_all());
        assert!(QueryValidator::validate_shape(&query).is_ok());
    }

    #[test]
    fn test_empty_groups_and_lists_rejected() {
        let query = Query::select(users()).filter(Condition::and(vec![]));
        assert!(QueryValidator::validate_shape(&query).is_err());

        let query = Query::select(users()).filter(Condition::is_in("id", Vec::<i64>::new()));
        assert!(QueryValidator::validate_shape(&query).is_err());
    }

    #[test]
    fn test_subquery_must_select_one_column() {
        let sub = Query::select(SourceRef::Table("orders".into())).fields(["user_id", "total"]);
        let query = Query::select(users()).filter(Condition::in_subquery("id", sub));
        assert!(QueryValidator::validate_shape(&query).is_err());
    }

    #[test]
    fn test_identifier_validation_reaches_nested_parts() {
        let query = Query::select(SourceRef::Table("1table".into()));
        assert!(QueryValidator::validate_identifiers(&query).is_err());

        let query = Query::select(users()).filter(Condition::or(vec![
            Condition::eq("id", 1),
            Condition::not(Condition::is_null(FieldReference::bare("x; DROP"))),
        ]));
        assert!(QueryValidator::validate_identifiers(&query).is_err());

        let query = Query::select(users()).aggregate(Aggregate::count_all().with_alias("total count"));
        assert!(QueryValidator::validate_identifiers(&query).is_err());

        let query = Query::insert(users()).values(row(json!({"name; --": 1})));
        assert!(QueryValidator::validate_identifiers(&query).is_err());
    }

    #[test]
    fn test_repeated_join_table_rejected() {
        let query = Query::select(users()).join(Join::inner(users(), Condition::eq_field("id", "users.parent_id")));
        let err = QueryValidator::validate_shape(&query).unwrap_err();
        assert!(err.to_string().contains("appears more than once"));
    }

    #[test]
    fn test_full_join_rejected_for_mysql() {
        let query = Query::select(users()).join(Join::new(
            JoinType::Full,
            SourceRef::Table("orders".into()),
            Condition::eq_field("id", "orders.user_id"),
        ));
        assert!(QueryValidator::validate(&query, &MySQLDialect).is_err());
        assert!(QueryValidator::validate(&query, &PostgreSQLDialect).is_ok());
    }

    #[test]
    fn test_full_join_inside_subquery_rejected_for_mysql() {
        let sub = Query::select(SourceRef::Table("orders".into()))
            .fields(["orders.user_id"])
            .join(Join::new(
                JoinType::Full,
                SourceRef::Table("refunds".into()),
                Condition::eq_field("orders.id", "refunds.order_id"),
            ));
        let query = Query::select(users()).filter(Condition::not(Condition::and(vec![
            Condition::eq("active", true),
            Condition::in_subquery("id", sub),
        ])));

        let err = QueryValidator::validate(&query, &MySQLDialect).unwrap_err();
        assert!(err.to_string().contains("FULL"));
        assert!(QueryValidator::validate(&query, &PostgreSQLDialect).is_ok());
    }
}
