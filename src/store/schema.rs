//! Table schema
//!
//! Supported field types:
//! - string: UTF-8 string
//! - int: 64-bit signed integer
//! - bool: Boolean
//! - float: 64-bit floating point
//!
//! Every field is optional; a document may not carry undeclared fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{StoreError, StoreResult};

/// Supported field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 64-bit floating point
    Float,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
        }
    }

    /// Returns true if `value` can be stored in a field of this type.
    ///
    /// Floats accept any JSON number; ints only integral ones.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float, Value::Number(_)) => true,
            _ => false,
        }
    }
}

/// Schema of the single table a store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Declared fields
    pub fields: BTreeMap<String, FieldType>,
}

impl TableSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    /// Look up a declared field's type.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Validate a row document against this schema.
    pub fn validate_document(&self, document: &Value) -> StoreResult<()> {
        let object = document.as_object().ok_or_else(|| {
            StoreError::InvalidDocument(format!("{}: document must be an object", self.name))
        })?;

        for (key, value) in object {
            let field_type = self.field_type(key).ok_or_else(|| {
                StoreError::InvalidDocument(format!("{}: undeclared field '{}'", self.name, key))
            })?;
            if !value.is_null() && !field_type.accepts(value) {
                return Err(StoreError::InvalidDocument(format!(
                    "{}: field '{}' expects {}",
                    self.name,
                    key,
                    field_type.type_name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_types() -> TableSchema {
        TableSchema::new("all_types")
            .field("column_long", FieldType::Int)
            .field("column_string", FieldType::String)
            .field("column_double", FieldType::Float)
            .field("column_boolean", FieldType::Bool)
    }

    #[test]
    fn test_valid_document() {
        let schema = all_types();
        let doc = json!({
            "column_long": 1,
            "column_string": "test data 1",
            "column_double": 3.1415,
            "column_boolean": false,
        });
        assert!(schema.validate_document(&doc).is_ok());
    }

    #[test]
    fn test_float_field_accepts_integer() {
        let schema = all_types();
        assert!(schema.validate_document(&json!({"column_double": 3})).is_ok());
    }

    #[test]
    fn test_int_field_rejects_float() {
        let schema = all_types();
        let err = schema
            .validate_document(&json!({"column_long": 1.5}))
            .unwrap_err();
        assert_eq!(err.code(), "AERO_INVALID_DOCUMENT");
    }

    #[test]
    fn test_undeclared_field_rejected() {
        let schema = all_types();
        assert!(schema.validate_document(&json!({"nope": 1})).is_err());
        assert!(schema.validate_document(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_schema_deserializes() {
        let schema: TableSchema = serde_json::from_value(json!({
            "name": "t",
            "fields": {"a": "int", "b": "string"}
        }))
        .unwrap();
        assert_eq!(schema.field_type("a"), Some(FieldType::Int));
        assert_eq!(schema.field_type("b"), Some(FieldType::String));
    }
}
