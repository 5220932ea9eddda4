//! The unit flowing through pipelines.
//!
//! A value is either a bare payload or a *(payload, metadata)* pair. The pair
//! is recognised structurally: a two-element [`Value::Tuple`] whose second
//! element is a [`Value::Map`]. Stages use [`Value::data`] and
//! [`Value::metadata`] instead of matching on the shape themselves.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Nested, string-keyed metadata. Key order carries no meaning.
pub type Map = BTreeMap<String, Value>;

/// JSON has no NaN or infinity, so those are written as strings.
mod float {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Special(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Special(name) => match name.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("not a float: {other:?}"))),
            },
        }
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float")] f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Map),
}

impl Value {
    /// Pair `data` with `metadata`.
    pub fn with_metadata(data: impl Into<Value>, metadata: Map) -> Self {
        Value::Tuple(vec![data.into(), Value::Map(metadata)])
    }

    /// True iff this is a two-element tuple whose second element is a map.
    pub fn has_metadata(&self) -> bool {
        matches!(self, Value::Tuple(items) if items.len() == 2 && matches!(items[1], Value::Map(_)))
    }

    /// The payload: the first element of a metadata pair, or the value itself.
    pub fn data(&self) -> &Value {
        match self {
            Value::Tuple(items) if self.has_metadata() => &items[0],
            _ => self,
        }
    }

    /// The metadata of a pair, if there is one.
    pub fn metadata(&self) -> Option<&Map> {
        match self {
            Value::Tuple(items) if items.len() == 2 => match &items[1] {
                Value::Map(map) => Some(map),
                _ => None,
            },
            _ => None,
        }
    }

    /// Split into payload and metadata. A bare value gets an empty map.
    pub fn into_data_metadata(self) -> (Value, Map) {
        match self {
            Value::Tuple(mut items) if items.len() == 2 && matches!(items[1], Value::Map(_)) => {
                let metadata = match items.pop() {
                    Some(Value::Map(map)) => map,
                    _ => Map::new(),
                };
                let data = items.pop().unwrap_or_default();
                (data, metadata)
            }
            other => (other, Map::new()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Payload of a possible *(data, metadata)* pair.
pub fn get_data(value: &Value) -> &Value {
    value.data()
}

/// Metadata of a possible pair, empty if there is none.
pub fn get_metadata(value: &Value) -> Map {
    value.metadata().cloned().unwrap_or_default()
}

/// Payload and metadata of a possible pair.
pub fn get_data_metadata(value: &Value) -> (&Value, Map) {
    (value.data(), get_metadata(value))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }

        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                join(f, items)?;
                write!(f, ")")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, value: i64) -> Map {
        let mut map = Map::new();
        map.insert(key.to_string(), Value::Int(value));
        map
    }

    #[test]
    fn test_non_finite_floats_survive_json() {
        let values = vec![
            Value::Float(f64::NAN),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(-0.25),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(
            json,
            r#"[{"Float":"NaN"},{"Float":"inf"},{"Float":"-inf"},{"Float":-0.25}]"#
        );
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert!(matches!(back[0], Value::Float(f) if f.is_nan()));
        assert_eq!(back[1..].to_vec(), values[1..].to_vec());
    }

    #[test]
    fn test_unknown_float_name_is_rejected() {
        assert!(serde_json::from_str::<Value>(r#"{"Float":"huge"}"#).is_err());
    }

    #[test]
    fn test_pair_is_recognised_structurally() {
        let pair = Value::with_metadata(3, meta("run", 1));
        assert!(pair.has_metadata());
        assert_eq!(pair.data(), &Value::Int(3));
        assert_eq!(get_metadata(&pair), meta("run", 1));

        // a tuple whose second element is not a map is plain data
        let plain = Value::Tuple(vec![Value::Int(1), Value::Int(2)]);
        assert!(!plain.has_metadata());
        assert_eq!(plain.data(), &plain);
        assert!(get_metadata(&plain).is_empty());

        // so is a list, even with a map in second position
        let list = Value::List(vec![Value::Int(1), Value::Map(meta("a", 1))]);
        assert!(!list.has_metadata());
    }

    #[test]
    fn test_unwrap_and_rewrap_keeps_metadata() {
        let pair = Value::with_metadata("x", meta("k", 7));
        let (data, metadata) = pair.clone().into_data_metadata();
        assert_eq!(Value::with_metadata(data, metadata), pair);

        let (data, metadata) = Value::Int(5).into_data_metadata();
        assert_eq!(data, Value::Int(5));
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_display() {
        let pair = Value::with_metadata(vec![1, 2], meta("n", 2));
        assert_eq!(pair.to_string(), "([1, 2], {\"n\": 2})");
    }
}
