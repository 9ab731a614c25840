// Repository
//
// One repository per logical source. Each public operation builds a Query in
// application field names, resolves it, reports conflicts, compiles it and
// hands the statement to the provider. The provider call is the only await
// point; no lock is held across it.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::QuerySettings;
use crate::error::AppError;
use crate::models::{
    Aggregate, AggregateFunction, Condition, Entity, FieldReference, Join, OrderBy, PreparedStatement, Query,
    RowSet, SourceRef,
};
use crate::services::conflict_detector::{ConflictDetector, ConflictWarning};
use crate::services::database::Provider;
use crate::services::field_mapper::FieldMapper;
use crate::services::field_resolver::{FieldResolver, ResolvedQuery};
use crate::services::row_mapper::RowMapper;
use crate::services::source_directory::{SourceBinding, SourceDirectory};
use crate::services::sql::{Dialect, StatementCompiler};
use crate::services::warning_sink::{TracingWarningSink, WarningSink};
use crate::validation::SqlValidator;

/// Alias of the single aggregate column in scalar aggregate queries
const SCALAR_ALIAS: &str = "result";

/// SELECT options in application field names
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub fields: Vec<FieldReference>,
    pub aggregates: Vec<Aggregate>,
    pub filter: Option<Condition>,
    pub group_by: Vec<FieldReference>,
    pub having: Option<Condition>,
    pub order_by: Vec<OrderBy>,
    pub joins: Vec<Join>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldReference>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    /// AND-combine with any filter already set
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(condition),
            None => condition,
        });
        self
    }

    pub fn group_by<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldReference>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(condition);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn into_query(self, from: SourceRef) -> Query {
        let mut query = Query::select(from);
        query.fields = self.fields;
        query.aggregates = self.aggregates;
        query.filter = self.filter;
        query.group_by = self.group_by;
        query.having = self.having;
        query.order_by = self.order_by;
        query.joins = self.joins;
        query.limit = self.limit;
        query.offset = self.offset;
        query
    }
}

/// Result of INSERT/UPDATE/DELETE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

impl From<RowSet> for WriteOutcome {
    fn from(rows: RowSet) -> Self {
        Self {
            affected_rows: rows.affected_rows,
            last_insert_id: rows.last_insert_id,
        }
    }
}

/// Dry-run output of [`Repository::compile`]
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub statement: PreparedStatement,
    pub warnings: Vec<ConflictWarning>,
}

pub struct Repository {
    binding: SourceBinding,
    directory: Arc<dyn SourceDirectory>,
    provider: Arc<dyn Provider>,
    compiler: StatementCompiler,
    warnings: Arc<dyn WarningSink>,
    primary_key: String,
    default_limit: Option<u64>,
    verify_statements: bool,
}

impl Repository {
    /// Repository for a registered logical source
    ///
    /// The dialect follows the provider's database type.
    pub fn new(
        source: &str,
        directory: Arc<dyn SourceDirectory>,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, AppError> {
        let binding = directory.resolve(source)?;
        let compiler = StatementCompiler::for_database(provider.database_type());

        Ok(Self {
            binding,
            directory,
            provider,
            compiler,
            warnings: Arc::new(TracingWarningSink),
            primary_key: "id".to_string(),
            default_limit: None,
            verify_statements: false,
        })
    }

    /// Override the dialect, e.g. with a custom quoting strategy
    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.compiler = StatementCompiler::new(dialect);
        self
    }

    pub fn with_warning_sink(mut self, sink: Arc<dyn WarningSink>) -> Self {
        self.warnings = sink;
        self
    }

    /// Application field used by `find_by_id`
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    pub fn with_default_limit(mut self, limit: Option<u64>) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_statement_verification(mut self, enabled: bool) -> Self {
        self.verify_statements = enabled;
        self
    }

    /// Apply `query.*` settings from configuration
    pub fn with_settings(self, settings: &QuerySettings) -> Self {
        self.with_default_limit(settings.default_limit)
            .with_statement_verification(settings.verify_statements)
    }

    pub fn source_name(&self) -> &str {
        &self.binding.name
    }

    pub fn table(&self) -> &str {
        &self.binding.table
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.binding.mapper
    }

    fn source(&self) -> SourceRef {
        SourceRef::Source(self.binding.name.clone())
    }

    fn resolve(&self, query: &Query) -> Result<ResolvedQuery, AppError> {
        let resolver = FieldResolver::new(self.directory.as_ref());
        let from = query.from.name();
        if from == self.binding.name || from == self.binding.table {
            resolver.resolve_with_primary(query, &self.binding)
        } else {
            resolver.resolve(query)
        }
    }

    /// Resolve, report conflicts and compile; no I/O
    fn prepare(&self, query: &Query) -> Result<(ResolvedQuery, CompiledQuery), AppError> {
        let resolved = self.resolve(query)?;
        let warnings = ConflictDetector::report(&resolved, self.warnings.as_ref());
        let statement = self.compiler.compile(&resolved.query)?;
        if self.verify_statements {
            SqlValidator::verify(&statement)?;
        }
        Ok((resolved, CompiledQuery { statement, warnings }))
    }

    /// Compile a query against this repository without executing it
    pub fn compile(&self, query: &Query) -> Result<CompiledQuery, AppError> {
        self.prepare(query).map(|(_, compiled)| compiled)
    }

    async fn run(&self, operation: &str, query: &Query) -> Result<(ResolvedQuery, RowSet), AppError> {
        let (resolved, compiled) = self.prepare(query)?;

        tracing::info!(
            "{}.{} on {} ({} params)",
            self.binding.name,
            operation,
            self.provider.database_type().as_str(),
            compiled.statement.params.len()
        );

        let rows = self
            .provider
            .execute(&compiled.statement)
            .await
            .map_err(|e| AppError::execution(operation, e))?;

        Ok((resolved, rows))
    }

    async fn select(&self, operation: &str, query: &Query) -> Result<Vec<Entity>, AppError> {
        let (resolved, rows) = self.run(operation, query).await?;
        Ok(RowMapper::map_rows(&rows.rows, &resolved.assignment))
    }

    async fn write(&self, operation: &str, query: &Query) -> Result<WriteOutcome, AppError> {
        let (_, rows) = self.run(operation, query).await?;
        Ok(rows.into())
    }

    /// Entities matching `options`; `default_limit` applies when no limit is given
    pub async fn find(&self, options: FindOptions) -> Result<Vec<Entity>, AppError> {
        let mut query = options.into_query(self.source());
        if query.limit.is_none() {
            query.limit = self.default_limit;
        }
        self.select("find", &query).await
    }

    pub async fn find_one(&self, condition: Condition) -> Result<Option<Entity>, AppError> {
        let query = Query::select(self.source()).filter(condition).limit(1);
        Ok(self.select("find_one", &query).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Entity>, AppError> {
        let query = Query::select(self.source())
            .filter(Condition::eq(FieldReference::bare(self.primary_key.clone()), id))
            .limit(1);
        Ok(self.select("find_by_id", &query).await?.into_iter().next())
    }

    pub async fn insert(&self, entity: Entity) -> Result<WriteOutcome, AppError> {
        let query = Query::insert(self.source()).values(entity);
        self.write("insert", &query).await
    }

    /// Insert several entities in one statement; all must carry the same fields
    pub async fn insert_many(&self, entities: Vec<Entity>) -> Result<WriteOutcome, AppError> {
        let mut query = Query::insert(self.source());
        query.values = Some(entities);
        self.write("insert_many", &query).await
    }

    pub async fn update(&self, condition: Condition, changes: Entity) -> Result<WriteOutcome, AppError> {
        let query = Query::update(self.source()).values(changes).filter(condition);
        self.write("update", &query).await
    }

    pub async fn delete(&self, condition: Condition) -> Result<WriteOutcome, AppError> {
        let query = Query::delete(self.source()).filter(condition);
        self.write("delete", &query).await
    }

    pub async fn count(&self, condition: Option<Condition>) -> Result<u64, AppError> {
        let value = self.scalar("count", Aggregate::count_all(), condition).await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    pub async fn exists(&self, condition: Condition) -> Result<bool, AppError> {
        let query = Query::select(self.source())
            .fields([FieldReference::bare(self.primary_key.clone())])
            .filter(condition)
            .limit(1);
        let (_, rows) = self.run("exists", &query).await?;
        Ok(!rows.rows.is_empty())
    }

    pub async fn sum(&self, field: &str, condition: Option<Condition>) -> Result<Value, AppError> {
        self.scalar("sum", Aggregate::new(AggregateFunction::Sum, field), condition)
            .await
    }

    pub async fn avg(&self, field: &str, condition: Option<Condition>) -> Result<Value, AppError> {
        self.scalar("avg", Aggregate::new(AggregateFunction::Avg, field), condition)
            .await
    }

    pub async fn min(&self, field: &str, condition: Option<Condition>) -> Result<Value, AppError> {
        self.scalar("min", Aggregate::new(AggregateFunction::Min, field), condition)
            .await
    }

    pub async fn max(&self, field: &str, condition: Option<Condition>) -> Result<Value, AppError> {
        self.scalar("max", Aggregate::new(AggregateFunction::Max, field), condition)
            .await
    }

    /// Single aggregate over the source; null when there is nothing to aggregate
    async fn scalar(
        &self,
        operation: &str,
        aggregate: Aggregate,
        condition: Option<Condition>,
    ) -> Result<Value, AppError> {
        let mut query = Query::select(self.source()).aggregate(aggregate.with_alias(SCALAR_ALIAS));
        query.filter = condition;

        let (_, rows) = self.run(operation, &query).await?;
        Ok(rows
            .rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(SCALAR_ALIAS))
            .unwrap_or(Value::Null))
    }
}
