// Condition Model
//
// Recursive, storage-independent filter tree. Leaves reference exactly one
// field; the right-hand side of a comparison is an explicit Operand so that
// literals and cross-field references are never confused.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::FieldReference;
use super::query::{Aggregate, Query};

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl ComparisonOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    /// Parse an operator symbol
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim() {
            "=" | "==" => Ok(ComparisonOp::Eq),
            "!=" | "<>" => Ok(ComparisonOp::Ne),
            "<" => Ok(ComparisonOp::Lt),
            "<=" => Ok(ComparisonOp::Le),
            ">" => Ok(ComparisonOp::Gt),
            ">=" => Ok(ComparisonOp::Ge),
            other => Err(format!("Unsupported comparison operator: {}", other)),
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Literal, always bound as a parameter
    Value(Value),
    /// Another column, rendered as an identifier
    Field(FieldReference),
}

impl Operand {
    pub fn as_field(&self) -> Option<&FieldReference> {
        match self {
            Operand::Field(field) => Some(field),
            Operand::Value(_) => None,
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<FieldReference> for Operand {
    fn from(field: FieldReference) -> Self {
        Operand::Field(field)
    }
}

/// Right-hand side of IN / NOT IN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberSet {
    List(Vec<Operand>),
    Subquery(Box<Query>),
}

/// Filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Comparison {
        field: FieldReference,
        op: ComparisonOp,
        value: Operand,
    },
    In {
        field: FieldReference,
        #[serde(default)]
        negated: bool,
        set: MemberSet,
    },
    Null {
        field: FieldReference,
        #[serde(default)]
        negated: bool,
    },
    Between {
        field: FieldReference,
        low: Value,
        high: Value,
    },
    Like {
        field: FieldReference,
        pattern: String,
    },
    /// Aggregate compared against an operand, used in HAVING
    AggregateComparison {
        aggregate: Aggregate,
        op: ComparisonOp,
        value: Operand,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(field: impl Into<FieldReference>, op: ComparisonOp, value: Operand) -> Self {
        Condition::Comparison {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<FieldReference>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Eq, Operand::Value(value.into()))
    }

    pub fn ne(field: impl Into<FieldReference>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Ne, Operand::Value(value.into()))
    }

    pub fn lt(field: impl Into<FieldReference>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Lt, Operand::Value(value.into()))
    }

    pub fn le(field: impl Into<FieldReference>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Le, Operand::Value(value.into()))
    }

    pub fn gt(field: impl Into<FieldReference>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Gt, Operand::Value(value.into()))
    }

    pub fn ge(field: impl Into<FieldReference>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Ge, Operand::Value(value.into()))
    }

    /// Column-to-column equality, the usual join predicate
    pub fn eq_field(field: impl Into<FieldReference>, other: impl Into<FieldReference>) -> Self {
        Self::compare(field, ComparisonOp::Eq, Operand::Field(other.into()))
    }

    pub fn is_in<I, V>(field: impl Into<FieldReference>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            field: field.into(),
            negated: false,
            set: MemberSet::List(values.into_iter().map(|v| Operand::Value(v.into())).collect()),
        }
    }

    pub fn not_in<I, V>(field: impl Into<FieldReference>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            field: field.into(),
            negated: true,
            set: MemberSet::List(values.into_iter().map(|v| Operand::Value(v.into())).collect()),
        }
    }

    pub fn in_subquery(field: impl Into<FieldReference>, query: Query) -> Self {
        Condition::In {
            field: field.into(),
            negated: false,
            set: MemberSet::Subquery(Box::new(query)),
        }
    }

    pub fn is_null(field: impl Into<FieldReference>) -> Self {
        Condition::Null {
            field: field.into(),
            negated: false,
        }
    }

    pub fn is_not_null(field: impl Into<FieldReference>) -> Self {
        Condition::Null {
            field: field.into(),
            negated: true,
        }
    }

    pub fn between(field: impl Into<FieldReference>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Condition::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn like(field: impl Into<FieldReference>, pattern: impl Into<String>) -> Self {
        Condition::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Combine with another condition under AND, flattening an existing AND
    pub fn and_also(self, other: Condition) -> Self {
        match self {
            Condition::And(mut items) => {
                items.push(other);
                Condition::And(items)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    /// Nesting depth; a leaf has depth 1
    pub fn depth(&self) -> usize {
        match self {
            Condition::And(items) | Condition::Or(items) => {
                1 + items.iter().map(Condition::depth).max().unwrap_or(0)
            }
            Condition::Not(inner) => 1 + inner.depth(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parsing() {
        assert_eq!(ComparisonOp::from_str("=").unwrap(), ComparisonOp::Eq);
        assert_eq!(ComparisonOp::from_str("<>").unwrap(), ComparisonOp::Ne);
        assert_eq!(ComparisonOp::from_str(" >= ").unwrap(), ComparisonOp::Ge);
        assert!(ComparisonOp::from_str("LIKE").is_err());
        assert_eq!(ComparisonOp::Ne.as_sql(), "<>");
    }

    #[test]
    fn test_builders_keep_literals_as_values() {
        let condition = Condition::eq("userName", "orders.userId");
        match condition {
            Condition::Comparison { value, .. } => {
                assert_eq!(value, Operand::Value(json!("orders.userId")));
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_eq_field_builds_field_operand() {
        let condition = Condition::eq_field("userId", "orders.userId");
        match condition {
            Condition::Comparison { value, .. } => {
                assert_eq!(value.as_field().unwrap().to_string(), "orders.userId");
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_and_also_flattens() {
        let combined = Condition::eq("a", 1).and_also(Condition::eq("b", 2)).and_also(Condition::eq("c", 3));
        match combined {
            Condition::And(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_depth() {
        let tree = Condition::and(vec![
            Condition::or(vec![Condition::eq("a", 1), Condition::not(Condition::eq("b", 2))]),
            Condition::is_null("c"),
        ]);
        assert_eq!(tree.depth(), 4);
        assert_eq!(Condition::like("name", "%a%").depth(), 1);
    }

    #[test]
    fn test_deserialize_condition() {
        let condition: Condition = serde_json::from_value(json!({
            "comparison": {
                "field": {"field": "userName"},
                "op": "=",
                "value": {"value": "john"}
            }
        }))
        .unwrap();
        assert_eq!(condition, Condition::eq("userName", "john"));
    }
}
