//! Dynamically shaped value tree
//!
//! The same [`Value`] type carries both sides of the round trip: the raw tree
//! produced by `decode`/`parse` and the external tree produced by `format`.
//! It serializes untagged, so it maps one-to-one onto JSON and YAML.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Ordered field map.
pub type Fields = IndexMap<String, Value>;

/// Shared null, returned for missing fields.
pub(crate) static NULL: Value = Value::Null;

/// A decoded or formatted value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Text(String),
    List(Vec<Value>),
    Map(Fields),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    fn mismatch(&self, expected: &str) -> CodecError {
        CodecError::Validation(format!("expected {expected}, found {}", self.kind()))
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Integer that must fit an unsigned 32-bit scalar.
    pub fn as_u32(&self) -> Result<u32> {
        let v = self.as_int()?;
        u32::try_from(v).map_err(|_| CodecError::RangeExceeded(format!("{v} is not a 32-bit unsigned value")))
    }

    pub fn as_text(&self) -> Result<&str> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(other.mismatch("text")),
        }
    }

    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(other.mismatch("list")),
        }
    }

    pub fn as_map(&self) -> Result<&Fields> {
        match self {
            Value::Map(fields) => Ok(fields),
            other => Err(other.mismatch("map")),
        }
    }

    /// Field of a map value; a missing field reads as null.
    pub fn field(&self, name: &str) -> Result<&Value> {
        Ok(self.as_map()?.get(name).unwrap_or(&NULL))
    }

    /// Canonical serialization used as the deduplication identity.
    ///
    /// Two values with the same identity encode to the same bytes.
    pub fn identity(&self) -> String {
        // Serializing this enum cannot fail: keys are strings, no floats.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Map(fields)
    }
}

/// Build a [`Value::Map`] from `name => value` pairs.
#[macro_export]
macro_rules! map {
    ($($name:expr => $value:expr),* $(,)?) => {{
        let mut fields = $crate::value::Fields::new();
        $(fields.insert(String::from($name), $crate::value::Value::from($value));)*
        $crate::value::Value::Map(fields)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let value = map! {
            "name" => "Potion",
            "price" => 50i64,
            "flags" => vec![Value::text("usable")],
            "unused" => Value::Null,
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"name":"Potion","price":50,"flags":["usable"],"unused":null}"#
        );

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
        assert_eq!(back.as_map().unwrap().keys().next().unwrap(), "name");
    }

    #[test]
    fn test_accessors() {
        let value = map! { "hp" => 10i64 };
        assert_eq!(value.field("hp").unwrap().as_int().unwrap(), 10);
        assert!(value.field("mp").unwrap().is_null());
        assert!(Value::text("x").as_int().is_err());
        assert!(Value::Int(-1).as_u32().is_err());
    }

    #[test]
    fn test_identity_distinguishes_shapes() {
        assert_ne!(Value::Int(1).identity(), Value::text("1").identity());
        assert_eq!(
            Value::List(vec![Value::Int(1)]).identity(),
            Value::List(vec![Value::Int(1)]).identity()
        );
    }
}
