//! # Typed attribute descriptors and the value model.
//!
//! A store's contract is its [`Schema`]: an insertion-ordered set of
//! [`SchemaItem`]s, each declaring a name, a [`ValueKind`], and a default
//! [`Value`]. Every stored value conforms to its declared kind at all times;
//! a write that would violate this fails immediately with a
//! [`SchemaError`](crate::SchemaError).
//!
//! ## Value model
//! [`Value`] is a closed set of storable shapes. Arbitrary user-defined
//! record types travel through [`Value::Record`] as JSON, so the schema can
//! declare domain types without the store knowing about them:
//!
//! ```rust
//! use magpie::store::Value;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Cursor { page: u64, done: bool }
//!
//! let v = Value::record(&Cursor { page: 3, done: false }).unwrap();
//! let back: Cursor = v.to_record().unwrap();
//! assert_eq!(back, Cursor { page: 3, done: false });
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Declared shape of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean flag.
    Bool,
    /// Signed integer.
    Int,
    /// Floating-point number.
    Float,
    /// UTF-8 text.
    Text,
    /// Ordered sequence of values.
    List,
    /// Opaque user-defined record (JSON shape).
    Record,
}

/// A storable value.
///
/// Values serialize as a tagged JSON object so both backends persist the
/// same representation and round-trip without schema knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Ordered sequence of values.
    List(Vec<Value>),
    /// Opaque user-defined record.
    Record(serde_json::Value),
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Record(_) => ValueKind::Record,
        }
    }

    /// Wraps a serializable user type as a [`Value::Record`].
    pub fn record<T: Serialize>(value: &T) -> Result<Self, SchemaError> {
        Ok(Value::Record(serde_json::to_value(value)?))
    }

    /// Converts a [`Value::Record`] back into a concrete user type.
    ///
    /// Fails with [`SchemaError::Record`] when the value is not a record or
    /// does not deserialize into `T`.
    pub fn to_record<T: for<'de> Deserialize<'de>>(&self) -> Result<T, SchemaError> {
        match self {
            Value::Record(v) => Ok(serde_json::from_value(v.clone())?),
            other => Err(SchemaError::KindMismatch {
                key: String::new(),
                expected: ValueKind::Record,
                actual: other.kind(),
            }),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// One typed attribute descriptor: declared kind plus default value.
#[derive(Debug, Clone)]
pub struct SchemaItem {
    kind: ValueKind,
    default: Value,
    /// For list slots: drop duplicate entries (first occurrence wins) when
    /// the slot's initial content is accepted.
    unique: bool,
}

impl SchemaItem {
    /// Declared kind of the attribute.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Default value returned for a key never explicitly written.
    pub fn default(&self) -> &Value {
        &self.default
    }

    /// Whether a list slot enforces the uniqueness invariant on its
    /// initial content.
    pub fn unique(&self) -> bool {
        self.unique
    }
}

/// Insertion-ordered mapping of attribute name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    items: IndexMap<String, SchemaItem>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attribute.
    ///
    /// Rejects a default whose kind does not match the declared kind; that
    /// mismatch is a misconfiguration and should abort startup.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        default: Value,
    ) -> Result<(), SchemaError> {
        self.add_item(name, kind, default, false)
    }

    /// Registers a list attribute that deduplicates its initial content.
    pub fn add_unique_list(
        &mut self,
        name: impl Into<String>,
        default: Vec<Value>,
    ) -> Result<(), SchemaError> {
        self.add_item(name, ValueKind::List, Value::List(default), true)
    }

    fn add_item(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        default: Value,
        unique: bool,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        if default.kind() != kind {
            return Err(SchemaError::KindMismatch {
                key: name,
                expected: kind,
                actual: default.kind(),
            });
        }
        self.items.insert(
            name,
            SchemaItem {
                kind,
                default,
                unique,
            },
        );
        Ok(())
    }

    /// Looks up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&SchemaItem> {
        self.items.get(name)
    }

    /// True if the key is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Iterates descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaItem)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validates a value against a registered key.
    pub fn check(&self, name: &str, value: &Value) -> Result<(), SchemaError> {
        let item = self.get(name).ok_or_else(|| SchemaError::UnknownKey {
            key: name.to_string(),
        })?;
        if value.kind() != item.kind {
            return Err(SchemaError::KindMismatch {
                key: name.to_string(),
                expected: item.kind,
                actual: value.kind(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_mismatched_default() {
        let mut schema = Schema::new();
        let err = schema
            .add("count", ValueKind::Int, Value::Text("nope".into()))
            .unwrap_err();
        assert_eq!(err.as_label(), "schema_kind_mismatch");
    }

    #[test]
    fn check_rejects_unknown_key_and_wrong_kind() {
        let mut schema = Schema::new();
        schema.add("count", ValueKind::Int, Value::Int(0)).unwrap();

        assert!(matches!(
            schema.check("missing", &Value::Int(1)),
            Err(SchemaError::UnknownKey { .. })
        ));
        assert!(matches!(
            schema.check("count", &Value::Bool(true)),
            Err(SchemaError::KindMismatch { .. })
        ));
        assert!(schema.check("count", &Value::Int(7)).is_ok());
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut schema = Schema::new();
        schema.add("b", ValueKind::Int, Value::Int(0)).unwrap();
        schema.add("a", ValueKind::Int, Value::Int(0)).unwrap();
        schema.add("c", ValueKind::Int, Value::Int(0)).unwrap();

        let names: Vec<&str> = schema.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn value_serialization_round_trips() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Text("two".into()),
            Value::Bool(true),
        ]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
