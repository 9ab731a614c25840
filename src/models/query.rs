// Query Model
//
// Storage-independent description of a SELECT/INSERT/UPDATE/DELETE. Built
// per call, resolved into storage names, compiled and then dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::condition::Condition;
use super::field::{FieldReference, SourceRef};

/// Application-shaped record: application field names to values
pub type Entity = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "SELECT",
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

/// Aggregate call; `field: None` stands for `*` and is only valid for COUNT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    #[serde(default)]
    pub field: Option<FieldReference>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub distinct: bool,
}

impl Aggregate {
    pub fn new(function: AggregateFunction, field: impl Into<FieldReference>) -> Self {
        Self {
            function,
            field: Some(field.into()),
            alias: None,
            distinct: false,
        }
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Self {
            function: AggregateFunction::Count,
            field: None,
            alias: None,
            distinct: false,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: FieldReference,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<FieldReference>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<FieldReference>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinType,
    pub target: SourceRef,
    pub on: Condition,
}

impl Join {
    pub fn new(kind: JoinType, target: SourceRef, on: Condition) -> Self {
        Self { kind, target, on }
    }

    pub fn inner(target: SourceRef, on: Condition) -> Self {
        Self::new(JoinType::Inner, target, on)
    }

    pub fn left(target: SourceRef, on: Condition) -> Self {
        Self::new(JoinType::Left, target, on)
    }
}

/// A single data operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub operation: Operation,
    pub from: SourceRef,
    #[serde(default)]
    pub fields: Vec<FieldReference>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(default, rename = "where")]
    pub filter: Option<Condition>,
    #[serde(default)]
    pub group_by: Vec<FieldReference>,
    #[serde(default)]
    pub having: Option<Condition>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    /// Rows for INSERT, the single assignment row for UPDATE
    #[serde(default)]
    pub values: Option<Vec<Entity>>,
}

impl Query {
    fn new(operation: Operation, from: SourceRef) -> Self {
        Self {
            operation,
            from,
            fields: Vec::new(),
            aggregates: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            values: None,
        }
    }

    pub fn select(from: SourceRef) -> Self {
        Self::new(Operation::Select, from)
    }

    pub fn insert(from: SourceRef) -> Self {
        Self::new(Operation::Insert, from)
    }

    pub fn update(from: SourceRef) -> Self {
        Self::new(Operation::Update, from)
    }

    pub fn delete(from: SourceRef) -> Self {
        Self::new(Operation::Delete, from)
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

    /// Add a WHERE condition, AND-ed with any existing one
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
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and_also(condition),
            None => condition,
        });
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

    /// Append a value row (INSERT) or set the assignment row (UPDATE)
    pub fn values(mut self, row: Entity) -> Self {
        self.values.get_or_insert_with(Vec::new).push(row);
        self
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }
}
