// Statement Compiler
//
// Turns a storage-resolved Query into dialect SQL plus an ordered parameter
// list. Every literal becomes a placeholder; the text never contains values.
// When a query has joins, bare columns are qualified with the primary table so
// the primary source wins any name clash.

use serde_json::Value;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{
    Aggregate, ComparisonOp, Condition, DatabaseType, FieldReference, MemberSet, Operand, Operation,
    PreparedStatement, Query,
};
use crate::validation::QueryValidator;

use super::dialect::Dialect;

/// Compiles queries for one dialect
#[derive(Clone)]
pub struct StatementCompiler {
    dialect: Arc<dyn Dialect>,
}

impl StatementCompiler {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    pub fn for_database(database_type: DatabaseType) -> Self {
        Self::new(database_type.dialect())
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Validate and compile a resolved query
    ///
    /// # Returns
    /// The statement, or a `Validation` error raised before any SQL is written
    pub fn compile(&self, query: &Query) -> Result<PreparedStatement, AppError> {
        QueryValidator::validate(query, self.dialect.as_ref())?;

        let mut writer = StatementWriter::new(self.dialect.as_ref());
        match query.operation {
            Operation::Select => writer.select(query),
            Operation::Insert => writer.insert(query),
            Operation::Update => writer.update(query),
            Operation::Delete => writer.delete(query),
        }

        tracing::debug!(
            "Compiled {} for {}: {} ({} params)",
            query.operation.as_str(),
            self.dialect.dialect_name(),
            writer.sql,
            writer.params.len()
        );

        Ok(PreparedStatement {
            sql: writer.sql,
            params: writer.params,
            operation: query.operation,
            database_type: self.dialect.database_type(),
        })
    }
}

impl std::fmt::Debug for StatementCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCompiler")
            .field("dialect", &self.dialect.dialect_name())
            .finish()
    }
}

/// Naming context of the query level being written
#[derive(Clone, Default)]
struct Scope {
    /// Primary table used to qualify bare columns, set only when joins exist
    qualify_with: Option<String>,
    /// Aggregate aliases, which HAVING and ORDER BY may name and must stay bare
    aliases: Vec<String>,
}

/// Single-use buffer; subqueries write into the same buffer so their
/// parameters land at the position their placeholders occupy
struct StatementWriter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    params: Vec<Value>,
    scope: Scope,
}

impl<'d> StatementWriter<'d> {
    fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(128),
            params: Vec::new(),
            scope: Scope::default(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &Value) {
        self.params.push(value.clone());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn ident(&mut self, ident: &str) {
        let quoted = self.dialect.quote_identifier(ident);
        self.push(&quoted);
    }

    fn field(&mut self, field: &FieldReference) {
        if field.qualifier.is_none() && self.scope.aliases.contains(&field.field) {
            let quoted = self.dialect.quote_identifier(&field.field);
            self.push(&quoted);
        } else {
            self.column(field);
        }
    }

    /// A column reference; bare columns take the primary table when joins exist
    fn column(&mut self, field: &FieldReference) {
        let rendered = match (field.qualifier_name(), &self.scope.qualify_with) {
            (Some(table), _) => self.dialect.quote_qualified(table, &field.field),
            (None, Some(primary)) => self.dialect.quote_qualified(primary, &field.field),
            (None, None) => self.dialect.quote_identifier(&field.field),
        };
        self.push(&rendered);
    }

    fn field_list(&mut self, fields: &[FieldReference]) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.field(field);
        }
    }

    fn aggregate(&mut self, aggregate: &Aggregate) {
        self.push(aggregate.function.as_sql());
        self.push("(");
        if aggregate.distinct {
            self.push("DISTINCT ");
        }
        match &aggregate.field {
            Some(field) => self.column(field),
            None => self.push("*"),
        }
        self.push(")");
    }

    fn select(&mut self, query: &Query) {
        let outer = std::mem::replace(
            &mut self.scope,
            Scope {
                qualify_with: query.has_joins().then(|| query.from.name().to_string()),
                aliases: Vec::new(),
            },
        );

        self.push("SELECT ");
        if query.fields.is_empty() && query.aggregates.is_empty() {
            self.push("*");
        } else {
            self.field_list(&query.fields);
            for (i, aggregate) in query.aggregates.iter().enumerate() {
                if i > 0 || !query.fields.is_empty() {
                    self.push(", ");
                }
                self.aggregate(aggregate);
                if let Some(alias) = &aggregate.alias {
                    self.push(" AS ");
                    self.ident(alias);
                }
            }
        }

        self.push(" FROM ");
        self.ident(query.from.name());

        for join in &query.joins {
            self.push(" ");
            self.push(join.kind.as_sql());
            self.push(" ");
            self.ident(join.target.name());
            self.push(" ON ");
            self.condition(&join.on);
        }

        self.where_clause(query);

        if !query.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.field_list(&query.group_by);
        }
        // Only HAVING and ORDER BY can see aggregate aliases
        self.scope.aliases = query.aggregates.iter().filter_map(|a| a.alias.clone()).collect();
        if let Some(having) = &query.having {
            self.push(" HAVING ");
            self.condition(having);
        }
        if !query.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in query.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.field(&order.field);
                self.push(" ");
                self.push(order.direction.as_sql());
            }
        }

        let dialect = self.dialect;
        dialect.write_pagination(&mut self.sql, query.limit, query.offset, !query.order_by.is_empty());

        self.scope = outer;
    }

    fn insert(&mut self, query: &Query) {
        let rows = query.values.as_deref().unwrap_or_default();
        let columns: Vec<&String> = rows.first().map(|row| row.keys().collect()).unwrap_or_default();

        self.push("INSERT INTO ");
        self.ident(query.from.name());
        self.push(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column);
        }
        self.push(") VALUES ");

        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                self.push(", ");
            }
            self.push("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.bind(row.get(column.as_str()).unwrap_or(&Value::Null));
            }
            self.push(")");
        }
    }

    fn update(&mut self, query: &Query) {
        self.push("UPDATE ");
        self.ident(query.from.name());
        self.push(" SET ");

        if let Some(row) = query.values.as_deref().and_then(|rows| rows.first()) {
            for (i, (column, value)) in row.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.ident(column);
                self.push(" = ");
                self.bind(value);
            }
        }

        self.where_clause(query);
    }

    fn delete(&mut self, query: &Query) {
        self.push("DELETE FROM ");
        self.ident(query.from.name());
        self.where_clause(query);
    }

    fn where_clause(&mut self, query: &Query) {
        if let Some(filter) = &query.filter {
            self.push(" WHERE ");
            self.condition(filter);
        }
    }

    fn operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Value(value) => self.bind(value),
            Operand::Field(field) => self.field(field),
        }
    }

    /// Right-hand side of a comparison; `= null` and `!= null` become null checks
    fn comparison(&mut self, op: ComparisonOp, value: &Operand) {
        match (op, value) {
            (ComparisonOp::Eq, Operand::Value(Value::Null)) => self.push(" IS NULL"),
            (ComparisonOp::Ne, Operand::Value(Value::Null)) => self.push(" IS NOT NULL"),
            _ => {
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.operand(value);
            }
        }
    }

    fn condition(&mut self, condition: &Condition) {
        match condition {
            Condition::Comparison { field, op, value } => {
                self.field(field);
                self.comparison(*op, value);
            }
            Condition::In { field, negated, set } => {
                self.field(field);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                match set {
                    MemberSet::List(items) => {
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                self.push(", ");
                            }
                            self.operand(item);
                        }
                    }
                    MemberSet::Subquery(subquery) => self.select(subquery),
                }
                self.push(")");
            }
            Condition::Null { field, negated } => {
                self.field(field);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::Between { field, low, high } => {
                self.field(field);
                self.push(" BETWEEN ");
                self.bind(low);
                self.push(" AND ");
                self.bind(high);
            }
            Condition::Like { field, pattern } => {
                self.field(field);
                self.push(" LIKE ");
                self.bind(&Value::String(pattern.clone()));
            }
            Condition::AggregateComparison { aggregate, op, value } => {
                self.aggregate(aggregate);
                self.comparison(*op, value);
            }
            Condition::And(items) => self.group(items, " AND "),
            Condition::Or(items) => self.group(items, " OR "),
            Condition::Not(inner) => {
                self.push("NOT ");
                match inner.as_ref() {
                    // Groups bring their own parentheses
                    Condition::And(_) | Condition::Or(_) => self.condition(inner),
                    _ => {
                        self.push("(");
                        self.condition(inner);
                        self.push(")");
                    }
                }
            }
        }
    }

    fn group(&mut self, items: &[Condition], separator: &str) {
        self.push("(");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.condition(item);
        }
        self.push(")");
    }
}
