//! value representation
//!
//! Literal values that flow through defaults, loaded documents and the produced configuration
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! Additionally:
//! - there is no `null`/`None` value. Documents containing `null` are rejected while loading.
//! - the only valid **implicit** conversion: every `integer` is also a `decimal`
//!
use crate::documents::LoadError;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};
use std::cmp::Ordering;

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(indexmap::IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&indexmap::IndexMap<String, Value>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short name of the value's type for messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Compare two scalar values
    ///
    /// Integers and decimals compare numerically. Values of unrelated types are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Decimal(b)) => (*a as f64).partial_cmp(b),
            (Value::Decimal(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Decimal(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Array(_) | Value::Object(_) => {
                let rendered = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<serde_yaml::Value> for Value {
    type Error = LoadError;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Bool(b) => Ok(b.into()),
            Yaml::Number(num) => {
                if let Some(int) = num.as_i64() {
                    return Ok(Value::Integer(int));
                }
                num.as_f64()
                    .map(Value::Decimal)
                    .ok_or_else(|| LoadError::UnsupportedValue(format!("number {num}")))
            }
            Yaml::String(s) => Ok(s.into()),
            Yaml::Sequence(sequence) => Ok(Value::Array(
                sequence
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            Yaml::Mapping(mapping) => {
                let mut object: indexmap::IndexMap<String, Value> =
                    indexmap::IndexMap::with_capacity(mapping.len());
                for (key, value) in mapping {
                    object.insert(yaml_key(key)?, Value::try_from(value)?);
                }
                Ok(Value::Object(object))
            }
            Yaml::Null => Err(LoadError::UnsupportedValue("null".to_string())),
            Yaml::Tagged(tagged) => Err(LoadError::UnsupportedValue(format!(
                "tagged value {}",
                tagged.tag
            ))),
        }
    }
}

/// Mapping keys are strings. Scalar keys such as `3` or `true` are turned into their string form.
fn yaml_key(key: serde_yaml::Value) -> Result<String, LoadError> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(num) => Ok(num.to_string()),
        other => Err(LoadError::UnsupportedValue(format!(
            "mapping key {other:?}"
        ))),
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = LoadError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;

        match value {
            Json::Bool(b) => Ok(b.into()),
            Json::Number(num) => {
                if let Some(int) = num.as_i64() {
                    return Ok(Value::Integer(int));
                }
                num.as_f64()
                    .map(Value::Decimal)
                    .ok_or_else(|| LoadError::UnsupportedValue(format!("number {num}")))
            }
            Json::String(s) => Ok(s.into()),
            Json::Array(array) => Ok(Value::Array(
                array
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            Json::Object(object) => Ok(Value::Object(
                object
                    .into_iter()
                    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                    .collect::<Result<_, LoadError>>()?,
            )),
            Json::Null => Err(LoadError::UnsupportedValue("null".to_string())),
        }
    }
}

impl TryFrom<hcl::Value> for Value {
    type Error = LoadError;

    fn try_from(value: hcl::Value) -> Result<Value, Self::Error> {
        match value {
            hcl::Value::Bool(b) => Ok(b.into()),
            hcl::Value::Number(n) => {
                if let Some(int) = n.as_i64() {
                    return Ok(Value::Integer(int));
                }
                n.as_f64()
                    .map(Value::Decimal)
                    .ok_or_else(|| LoadError::UnsupportedValue(format!("number {n}")))
            }
            hcl::Value::String(s) => Ok(s.into()),
            hcl::Value::Array(a) => Ok(Value::Array(
                a.into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            hcl::Value::Object(o) => Ok(Value::Object(
                o.into_iter()
                    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                    .collect::<Result<_, LoadError>>()?,
            )),
            hcl::Value::Null => Err(LoadError::UnsupportedValue("null".to_string())),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}
