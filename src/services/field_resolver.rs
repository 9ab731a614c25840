// Field Resolver
//
// Rewrites every field reference of a query from application names into
// storage names, picking the mapper per reference: bare names belong to the
// primary source, qualified names to the join (or registered source) they
// name. Output references are either bare primary columns or qualified by a
// storage table, never by a logical source name.

use serde_json::Value;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{
    Aggregate, Condition, FieldReference, Join, MemberSet, Operand, OrderBy, Qualifier, Query, SourceRef,
};
use crate::services::field_mapper::FieldMapper;
use crate::services::source_directory::{SourceBinding, SourceDirectory};

/// A join source after resolution
#[derive(Debug, Clone)]
pub struct JoinBinding {
    /// Logical source name when the join named one, else the storage table
    pub label: String,
    pub table: String,
    pub mapper: Arc<FieldMapper>,
    /// Whether the join was declared through a logical source
    pub logical: bool,
}

/// Which mapper serves which table, shared by resolution, conflict detection
/// and result row mapping
#[derive(Debug, Clone)]
pub struct SourceAssignment {
    /// Logical name of the primary source (the table name if it has none)
    pub primary_name: String,
    pub primary_table: String,
    pub primary: Arc<FieldMapper>,
    /// Join sources in declaration order
    pub joins: Vec<JoinBinding>,
}

impl SourceAssignment {
    pub fn join_by_table(&self, table: &str) -> Option<&JoinBinding> {
        self.joins.iter().find(|join| join.table == table)
    }

    pub fn join_by_source(&self, name: &str) -> Option<&JoinBinding> {
        self.joins.iter().find(|join| join.logical && join.label == name)
    }
}

/// A query in storage names plus the mapper assignment used to produce it
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub query: Query,
    pub assignment: SourceAssignment,
}

/// Outcome of classifying a qualifier: (storage table, mapper)
type Target = (String, Arc<FieldMapper>);

pub struct FieldResolver<'a> {
    directory: &'a dyn SourceDirectory,
}

impl<'a> FieldResolver<'a> {
    pub fn new(directory: &'a dyn SourceDirectory) -> Self {
        Self { directory }
    }

    /// Resolve a query whose primary source is found through the directory
    ///
    /// A `SourceRef::Table` the directory does not know gets an identity mapper.
    pub fn resolve(&self, query: &Query) -> Result<ResolvedQuery, AppError> {
        let primary = self.primary_binding(&query.from)?;
        self.resolve_with_primary(query, &primary)
    }

    /// Resolve a query against an explicit primary source binding
    pub fn resolve_with_primary(&self, query: &Query, primary: &SourceBinding) -> Result<ResolvedQuery, AppError> {
        let mut assignment = SourceAssignment {
            primary_name: primary.name.clone(),
            primary_table: primary.table.clone(),
            primary: primary.mapper.clone(),
            joins: Vec::with_capacity(query.joins.len()),
        };
        for join in &query.joins {
            assignment.joins.push(self.bind_join(&join.target)?);
        }

        let scope = Scope {
            resolver: self,
            assignment: &assignment,
            aliases: Vec::new(),
        };
        // HAVING and ORDER BY may name an aggregate alias instead of a field
        let aliases: Vec<&str> = query.aggregates.iter().filter_map(|a| a.alias.as_deref()).collect();
        let post_scope = Scope { aliases, ..scope.clone() };

        let resolved = Query {
            operation: query.operation,
            from: SourceRef::Table(assignment.primary_table.clone()),
            fields: scope.fields(&query.fields)?,
            aggregates: query
                .aggregates
                .iter()
                .map(|aggregate| scope.aggregate(aggregate))
                .collect::<Result<_, _>>()?,
            filter: query.filter.as_ref().map(|c| scope.condition(c, false)).transpose()?,
            group_by: scope.fields(&query.group_by)?,
            having: query.having.as_ref().map(|c| post_scope.condition(c, false)).transpose()?,
            order_by: query
                .order_by
                .iter()
                .map(|order| {
                    Ok(OrderBy {
                        field: post_scope.field(&order.field)?,
                        direction: order.direction,
                    })
                })
                .collect::<Result<_, AppError>>()?,
            joins: query
                .joins
                .iter()
                .zip(&assignment.joins)
                .map(|(join, binding)| {
                    Ok(Join {
                        kind: join.kind,
                        target: SourceRef::Table(binding.table.clone()),
                        on: scope.condition(&join.on, true)?,
                    })
                })
                .collect::<Result<_, AppError>>()?,
            limit: query.limit,
            offset: query.offset,
            values: query
                .values
                .as_ref()
                .map(|rows| rows.iter().map(|row| assignment.primary.entity_to_row(row)).collect()),
        };

        Ok(ResolvedQuery {
            query: resolved,
            assignment,
        })
    }

    fn primary_binding(&self, from: &SourceRef) -> Result<SourceBinding, AppError> {
        match from {
            SourceRef::Source(name) => self.directory.resolve(name),
            SourceRef::Table(table) => Ok(self.directory.find_by_table(table).unwrap_or_else(|| SourceBinding {
                name: table.clone(),
                table: table.clone(),
                mapper: Arc::new(FieldMapper::identity()),
            })),
        }
    }

    fn bind_join(&self, target: &SourceRef) -> Result<JoinBinding, AppError> {
        match target {
            SourceRef::Source(name) => {
                let binding = self.directory.resolve(name).map_err(|_| {
                    AppError::Mapping(format!("Join references unregistered source '{}'", name))
                })?;
                Ok(JoinBinding {
                    label: name.clone(),
                    table: binding.table,
                    mapper: binding.mapper,
                    logical: true,
                })
            }
            SourceRef::Table(table) => {
                let mapper = self
                    .directory
                    .find_by_table(table)
                    .map(|binding| binding.mapper)
                    .unwrap_or_else(|| Arc::new(FieldMapper::identity()));
                Ok(JoinBinding {
                    label: table.clone(),
                    table: table.clone(),
                    mapper,
                    logical: false,
                })
            }
        }
    }
}

/// Resolution context for one query level
#[derive(Clone)]
struct Scope<'r, 'a> {
    resolver: &'r FieldResolver<'a>,
    assignment: &'r SourceAssignment,
    /// Bare names left untouched because they name an aggregate alias
    aliases: Vec<&'r str>,
}

impl Scope<'_, '_> {
    fn fields(&self, fields: &[FieldReference]) -> Result<Vec<FieldReference>, AppError> {
        fields.iter().map(|field| self.field(field)).collect()
    }

    fn field(&self, field: &FieldReference) -> Result<FieldReference, AppError> {
        if field.qualifier.is_none() && self.aliases.contains(&field.field.as_str()) {
            return Ok(field.clone());
        }
        self.column(field)
    }

    /// Map a reference to its storage column, ignoring aggregate aliases
    fn column(&self, field: &FieldReference) -> Result<FieldReference, AppError> {
        match &field.qualifier {
            None => Ok(FieldReference::bare(
                self.assignment.primary.to_storage_name(&field.field),
            )),
            Some(qualifier) => {
                let (table, mapper) = self.target(qualifier)?;
                let column = mapper.to_storage_name(&field.field).to_string();
                Ok(FieldReference::table(table, column))
            }
        }
    }

    fn target(&self, qualifier: &Qualifier) -> Result<Target, AppError> {
        match qualifier {
            Qualifier::Source(name) => self.source_target(name),
            Qualifier::Table(table) => Ok(self.table_target(table)),
            Qualifier::Name(name) => {
                let assignment = self.assignment;
                if assignment.join_by_source(name).is_some() {
                    self.source_target(name)
                } else if assignment.join_by_table(name).is_some() || assignment.primary_table == *name {
                    Ok(self.table_target(name))
                } else if assignment.primary_name == *name || self.resolver.directory.contains(name) {
                    self.source_target(name)
                } else {
                    Ok(self.table_target(name))
                }
            }
        }
    }

    /// Logical source: declared joins first, then the primary, then the directory
    fn source_target(&self, name: &str) -> Result<Target, AppError> {
        if let Some(join) = self.assignment.join_by_source(name) {
            return Ok((join.table.clone(), join.mapper.clone()));
        }
        if self.assignment.primary_name == name {
            return Ok((self.assignment.primary_table.clone(), self.assignment.primary.clone()));
        }
        let binding = self.resolver.directory.resolve(name).map_err(|_| {
            AppError::Mapping(format!("Cannot resolve field qualifier: unknown source '{}'", name))
        })?;
        Ok((binding.table, binding.mapper))
    }

    /// Storage table: a join on that table lends its mapper, anything else
    /// falls back to the primary mapper; the qualifier is kept as-is
    fn table_target(&self, table: &str) -> Target {
        let mapper = match self.assignment.join_by_table(table) {
            Some(join) => join.mapper.clone(),
            None => self.assignment.primary.clone(),
        };
        (table.to_string(), mapper)
    }

    fn aggregate(&self, aggregate: &Aggregate) -> Result<Aggregate, AppError> {
        Ok(Aggregate {
            function: aggregate.function,
            field: aggregate.field.as_ref().map(|field| self.column(field)).transpose()?,
            alias: aggregate.alias.clone(),
            distinct: aggregate.distinct,
        })
    }

    fn operand(&self, operand: &Operand, in_join: bool) -> Result<Operand, AppError> {
        match operand {
            Operand::Field(field) => Ok(Operand::Field(self.field(field)?)),
            Operand::Value(Value::String(raw)) if in_join => match self.join_reference(raw) {
                Some(field) => Ok(Operand::Field(self.field(&field)?)),
                None => Ok(operand.clone()),
            },
            Operand::Value(_) => Ok(operand.clone()),
        }
    }

    /// A string in an ON clause is a column reference only when it has the
    /// dotted `qualifier.field` shape and the qualifier names a source or
    /// table taking part in this query
    fn join_reference(&self, raw: &str) -> Option<FieldReference> {
        let field = FieldReference::parse(raw);
        let name = field.qualifier_name()?;
        let assignment = self.assignment;
        let known = assignment.join_by_source(name).is_some()
            || assignment.join_by_table(name).is_some()
            || assignment.primary_table == name
            || assignment.primary_name == name;
        known.then_some(field)
    }

    fn condition(&self, condition: &Condition, in_join: bool) -> Result<Condition, AppError> {
        Ok(match condition {
            Condition::Comparison { field, op, value } => Condition::Comparison {
                field: self.field(field)?,
                op: *op,
                value: self.operand(value, in_join)?,
            },
            Condition::In { field, negated, set } => Condition::In {
                field: self.field(field)?,
                negated: *negated,
                set: match set {
                    MemberSet::List(items) => MemberSet::List(
                        items
                            .iter()
                            .map(|item| self.operand(item, in_join))
                            .collect::<Result<_, _>>()?,
                    ),
                    MemberSet::Subquery(subquery) => {
                        MemberSet::Subquery(Box::new(self.resolver.resolve(subquery)?.query))
                    }
                },
            },
            Condition::Null { field, negated } => Condition::Null {
                field: self.field(field)?,
                negated: *negated,
            },
            Condition::Between { field, low, high } => Condition::Between {
                field: self.field(field)?,
                low: low.clone(),
                high: high.clone(),
            },
            Condition::Like { field, pattern } => Condition::Like {
                field: self.field(field)?,
                pattern: pattern.clone(),
            },
            Condition::AggregateComparison { aggregate, op, value } => Condition::AggregateComparison {
                aggregate: self.aggregate(aggregate)?,
                op: *op,
                value: self.operand(value, in_join)?,
            },
            Condition::And(items) => Condition::And(
                items
                    .iter()
                    .map(|item| self.condition(item, in_join))
                    .collect::<Result<_, _>>()?,
            ),
            Condition::Or(items) => Condition::Or(
                items
                    .iter()
                    .map(|item| self.condition(item, in_join))
                    .collect::<Result<_, _>>()?,
            ),
            Condition::Not(inner) => Condition::Not(Box::new(self.condition(inner, in_join)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateFunction, ComparisonOp};
    use crate::services::source_directory::SourceRegistry;
    use serde_json::json;

    fn registry() -> SourceRegistry {
        SourceRegistry::new()
            .with_source(
                "users",
                "users",
                FieldMapper::new([("id", "id"), ("userId", "user_id"), ("userName", "user_name")]).unwrap(),
            )
            .unwrap()
            .with_source(
                "orders",
                "shop_orders",
                FieldMapper::new([("orderId", "order_id"), ("userId", "user_id"), ("total", "total_cents")])
                    .unwrap(),
            )
            .unwrap()
    }

    fn users_with_orders() -> Query {
        Query::select(SourceRef::Source("users".into()))
            .fields(["userId", "orders.orderId"])
            .join(Join::inner(
                SourceRef::Source("orders".into()),
                Condition::eq("userId", "orders.userId"),
            ))
    }

    #[test]
    fn test_primary_fields_stay_unqualified() {
        let registry = registry();
        let resolved = FieldResolver::new(&registry)
            .resolve(&Query::select(SourceRef::Source("users".into())).fields(["userName"]))
            .unwrap();

        assert_eq!(resolved.query.from, SourceRef::Table("users".into()));
        assert_eq!(resolved.query.fields, vec![FieldReference::bare("user_name")]);
    }

    #[test]
    fn test_logical_source_requalified_by_storage_table() {
        let registry = registry();
        let resolved = FieldResolver::new(&registry).resolve(&users_with_orders()).unwrap();

        assert_eq!(
            resolved.query.fields,
            vec![
                FieldReference::bare("user_id"),
                FieldReference::table("shop_orders", "order_id"),
            ]
        );
        assert_eq!(resolved.query.joins[0].target, SourceRef::Table("shop_orders".into()));
        assert_eq!(resolved.assignment.joins[0].label, "orders");
        assert!(resolved.assignment.joins[0].logical);
    }

    #[test]
    fn test_join_on_string_value_becomes_column_reference() {
        let registry = registry();
        let resolved = FieldResolver::new(&registry).resolve(&users_with_orders()).unwrap();

        assert_eq!(
            resolved.query.joins[0].on,
            Condition::Comparison {
                field: FieldReference::bare("user_id"),
                op: ComparisonOp::Eq,
                value: Operand::Field(FieldReference::table("shop_orders", "user_id")),
            }
        );
    }

    #[test]
    fn test_where_string_value_stays_literal() {
        let registry = registry();
        let query = users_with_orders().filter(Condition::eq("userName", "orders.userId"));
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        assert_eq!(
            resolved.query.filter,
            Some(Condition::Comparison {
                field: FieldReference::bare("user_name"),
                op: ComparisonOp::Eq,
                value: Operand::Value(json!("orders.userId")),
            })
        );
    }

    #[test]
    fn test_join_on_dotted_literal_with_unknown_qualifier_stays_literal() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("users".into())).join(Join::inner(
            SourceRef::Source("orders".into()),
            Condition::eq("userName", "john.doe"),
        ));
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        match &resolved.query.joins[0].on {
            Condition::Comparison { value, .. } => assert_eq!(value, &Operand::Value(json!("john.doe"))),
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_table_qualifier_uses_matching_join_mapper() {
        let registry = registry();
        let query = users_with_orders().order_by(OrderBy::desc(FieldReference::table("shop_orders", "total")));
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        assert_eq!(
            resolved.query.order_by[0].field,
            FieldReference::table("shop_orders", "total_cents")
        );
    }

    #[test]
    fn test_unjoined_table_qualifier_falls_back_to_primary_mapper() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("users".into()))
            .fields([FieldReference::table("audit", "userName")]);
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        assert_eq!(resolved.query.fields, vec![FieldReference::table("audit", "user_name")]);
    }

    #[test]
    fn test_direct_table_join() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("users".into()))
            .fields(["shop_orders.total"])
            .join(Join::left(
                SourceRef::Table("shop_orders".into()),
                Condition::eq_field("id", FieldReference::table("shop_orders", "userId")),
            ));
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        let binding = &resolved.assignment.joins[0];
        assert_eq!(binding.label, "shop_orders");
        assert!(!binding.logical);
        // The directory knows the table, so its mapper applies
        assert_eq!(resolved.query.fields, vec![FieldReference::table("shop_orders", "total_cents")]);
    }

    #[test]
    fn test_unregistered_join_source_is_mapping_error() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("users".into())).join(Join::inner(
            SourceRef::Source("invoices".into()),
            Condition::eq_field("id", "invoices.userId"),
        ));
        let err = FieldResolver::new(&registry).resolve(&query).unwrap_err();
        assert!(matches!(err, AppError::Mapping(ref msg) if msg.contains("invoices")));
    }

    #[test]
    fn test_unknown_source_qualifier_is_mapping_error() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("users".into()))
            .fields([FieldReference::source("payments", "amount")]);
        let err = FieldResolver::new(&registry).resolve(&query).unwrap_err();
        assert!(matches!(err, AppError::Mapping(ref msg) if msg.contains("payments")));
    }

    #[test]
    fn test_dotted_and_structured_references_resolve_identically() {
        let registry = registry();
        let resolver = FieldResolver::new(&registry);
        let dotted = users_with_orders().filter(Condition::gt("shop_orders.total", 10));
        let structured =
            users_with_orders().filter(Condition::gt(FieldReference::table("shop_orders", "total"), 10));

        assert_eq!(
            resolver.resolve(&dotted).unwrap().query,
            resolver.resolve(&structured).unwrap().query
        );
    }

    #[test]
    fn test_values_mapped_through_primary_mapper() {
        let registry = registry();
        let query = Query::insert(SourceRef::Source("users".into()))
            .values(json!({"id": 1, "userName": "john"}).as_object().cloned().unwrap());
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        let row = &resolved.query.values.unwrap()[0];
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["id", "user_name"]);
    }

    #[test]
    fn test_subquery_resolved_with_its_own_mapper() {
        let registry = registry();
        let subquery = Query::select(SourceRef::Source("orders".into()))
            .fields(["userId"])
            .filter(Condition::gt("total", 100));
        let query = Query::select(SourceRef::Source("users".into())).filter(Condition::in_subquery("id", subquery));
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        match resolved.query.filter {
            Some(Condition::In {
                set: MemberSet::Subquery(sub),
                ..
            }) => {
                assert_eq!(sub.from, SourceRef::Table("shop_orders".into()));
                assert_eq!(sub.fields, vec![FieldReference::bare("user_id")]);
                assert_eq!(sub.filter, Some(Condition::gt("total_cents", 100)));
            }
            other => panic!("unexpected filter: {:?}", other),
        }
    }

    #[test]
    fn test_aggregates_and_group_by_resolved() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("orders".into()))
            .fields(["userId"])
            .aggregate(Aggregate::new(AggregateFunction::Sum, "total").with_alias("spent"))
            .group_by(["userId"])
            .having(Condition::AggregateComparison {
                aggregate: Aggregate::new(AggregateFunction::Sum, "total"),
                op: ComparisonOp::Gt,
                value: Operand::Value(json!(1000)),
            });
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        assert_eq!(resolved.query.aggregates[0].field, Some(FieldReference::bare("total_cents")));
        assert_eq!(resolved.query.group_by, vec![FieldReference::bare("user_id")]);
        match resolved.query.having {
            Some(Condition::AggregateComparison { aggregate, .. }) => {
                assert_eq!(aggregate.field, Some(FieldReference::bare("total_cents")));
            }
            other => panic!("unexpected having: {:?}", other),
        }
    }

    #[test]
    fn test_order_by_aggregate_alias_left_unmapped() {
        let registry = registry();
        let query = Query::select(SourceRef::Source("orders".into()))
            .fields(["userId"])
            .aggregate(Aggregate::new(AggregateFunction::Sum, "total").with_alias("total"))
            .group_by(["userId"])
            .having(Condition::gt("total", 100))
            .order_by(OrderBy::desc("total"));
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();

        // The aggregated column itself is still mapped
        assert_eq!(resolved.query.aggregates[0].field, Some(FieldReference::bare("total_cents")));
        assert_eq!(resolved.query.order_by[0].field, FieldReference::bare("total"));
        assert_eq!(resolved.query.having, Some(Condition::gt("total", 100)));
        // Outside HAVING and ORDER BY the name is a field again
        assert_eq!(resolved.query.group_by, vec![FieldReference::bare("user_id")]);
    }

    #[test]
    fn test_unknown_table_gets_identity_mapper() {
        let registry = registry();
        let query = Query::select(SourceRef::Table("legacy".into())).fields(["someField"]);
        let resolved = FieldResolver::new(&registry).resolve(&query).unwrap();
        assert_eq!(resolved.query.fields, vec![FieldReference::bare("someField")]);
        assert_eq!(resolved.assignment.primary_name, "legacy");
    }
}
