//! Query predicates
//!
//! A predicate is a conjunction of field conditions. An empty predicate
//! matches every live row.

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::schema::TableSchema;

/// Filter operation for a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equality: field = value
    Eq(Value),
    /// Greater than or equal: field >= value
    Gte(Value),
    /// Greater than: field > value
    Gt(Value),
    /// Less than or equal: field <= value
    Lte(Value),
    /// Less than: field < value
    Lt(Value),
    /// Inclusive range: low <= field <= high
    Between(Value, Value),
}

impl FilterOp {
    /// Returns the operation name for log output
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "eq",
            FilterOp::Gte(_) => "gte",
            FilterOp::Gt(_) => "gt",
            FilterOp::Lte(_) => "lte",
            FilterOp::Lt(_) => "lt",
            FilterOp::Between(_, _) => "between",
        }
    }

    fn operands(&self) -> Vec<&Value> {
        match self {
            FilterOp::Eq(v)
            | FilterOp::Gte(v)
            | FilterOp::Gt(v)
            | FilterOp::Lte(v)
            | FilterOp::Lt(v) => vec![v],
            FilterOp::Between(low, high) => vec![low, high],
        }
    }

    fn is_range(&self) -> bool {
        !matches!(self, FilterOp::Eq(_))
    }
}

/// A condition on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field name
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
}

/// Conjunction of conditions evaluated by a store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// A predicate matching every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a condition
    pub fn and(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op,
        });
        self
    }

    /// Add an equality condition
    pub fn eq(self, field: impl Into<String>, value: Value) -> Self {
        self.and(field, FilterOp::Eq(value))
    }

    /// Add a `>=` condition
    pub fn gte(self, field: impl Into<String>, value: Value) -> Self {
        self.and(field, FilterOp::Gte(value))
    }

    /// Add a `>` condition
    pub fn gt(self, field: impl Into<String>, value: Value) -> Self {
        self.and(field, FilterOp::Gt(value))
    }

    /// Add a `<=` condition
    pub fn lte(self, field: impl Into<String>, value: Value) -> Self {
        self.and(field, FilterOp::Lte(value))
    }

    /// Add a `<` condition
    pub fn lt(self, field: impl Into<String>, value: Value) -> Self {
        self.and(field, FilterOp::Lt(value))
    }

    /// Add an inclusive range condition
    pub fn between(self, field: impl Into<String>, low: Value, high: Value) -> Self {
        self.and(field, FilterOp::Between(low, high))
    }

    /// The conditions, in declaration order
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Check every condition against the schema.
    ///
    /// Fails with `InvalidPredicate` on an undeclared field, an operand whose
    /// type the field cannot hold, or a range over a boolean field.
    pub fn validate(&self, schema: &TableSchema) -> StoreResult<()> {
        for condition in &self.conditions {
            let field_type = schema.field_type(&condition.field).ok_or_else(|| {
                StoreError::InvalidPredicate(format!(
                    "{}: unknown field '{}'",
                    schema.name, condition.field
                ))
            })?;

            for operand in condition.op.operands() {
                if !field_type.accepts(operand) {
                    return Err(StoreError::InvalidPredicate(format!(
                        "{}: '{}' {} expects {} operand, got {}",
                        schema.name,
                        condition.field,
                        condition.op.op_name(),
                        field_type.type_name(),
                        operand
                    )));
                }
            }

            if condition.op.is_range() && field_type == super::FieldType::Bool {
                return Err(StoreError::InvalidPredicate(format!(
                    "{}: range '{}' on bool field '{}'",
                    schema.name,
                    condition.op.op_name(),
                    condition.field
                )));
            }
        }
        Ok(())
    }
}
