//! Dynamic column values.
//!
//! Collection tables are created at runtime, so rows cannot be described by
//! Rust structs. A row is a [`Record`]: an insertion-ordered map of column
//! name to [`FieldValue`]. `FieldValue` covers exactly the SQLite storage
//! classes the backend writes (NULL, INTEGER, REAL, TEXT).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row of a collection table (or any query result), keyed by column name.
pub type Record = IndexMap<String, FieldValue>;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// SQL `NULL`.
    Null,
    /// A boolean. Stored as INTEGER 0/1.
    Bool(bool),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit float.
    Real(f64),
    /// Text.
    Text(String),
}

impl FieldValue {
    /// Convert an arbitrary JSON value into a column value.
    ///
    /// Arrays and objects have no column representation and are stored as
    /// their JSON text.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Text(s),
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Text(other.to_string())
            }
        }
    }

    /// Convert to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Real(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Whether this is SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The text payload, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload. Booleans count as 0/1.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_maps_scalars() {
        assert_eq!(FieldValue::from_json(json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::from_json(json!(true)), FieldValue::Bool(true));
        assert_eq!(FieldValue::from_json(json!(42)), FieldValue::Integer(42));
        assert_eq!(FieldValue::from_json(json!(1.5)), FieldValue::Real(1.5));
        assert_eq!(FieldValue::from_json(json!("x")), FieldValue::from("x"));
    }

    #[test]
    fn from_json_stores_structures_as_text() {
        let value = FieldValue::from_json(json!({"tags": ["a", "b"]}));
        assert_eq!(value, FieldValue::from(r#"{"tags":["a","b"]}"#));
    }

    #[test]
    fn record_serializes_in_insertion_order() {
        let mut record = Record::new();
        record.insert("id".into(), FieldValue::from("r1"));
        record.insert("title".into(), FieldValue::from("Hi"));
        record.insert("views".into(), FieldValue::Integer(3));
        record.insert("body".into(), FieldValue::Null);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":"r1","title":"Hi","views":3,"body":null}"#);
    }

    #[test]
    fn non_finite_reals_serialize_as_null() {
        assert_eq!(FieldValue::Real(f64::NAN).to_json(), json!(null));
    }

    #[test]
    fn option_conversion() {
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(7_i64)), FieldValue::Integer(7));
    }
}
