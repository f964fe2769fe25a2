use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of a [`SimpleValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Text,
    Int,
    Float,
    Bool,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

/// Scalar value stored on a node or an edge.
///
/// Simple topics (data type text, html, number, boolean) carry their value
/// here; composite topics carry their derived label as text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimpleValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl SimpleValue {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: ints widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Canonical string used as the key of value indexes.
    ///
    /// Kind-prefixed, so `Text("1")` and `Int(1)` never collide.
    pub fn index_key(&self) -> String {
        match self {
            Self::Text(s) => format!("t:{s}"),
            Self::Int(i) => format!("i:{i}"),
            Self::Float(f) => format!("f:{}", f.to_bits()),
            Self::Bool(b) => format!("b:{b}"),
        }
    }

    /// Parse user input as a value of the given kind.
    pub fn parse_as(kind: ValueKind, input: &str) -> Result<Self, TypeError> {
        let err = || TypeError::InvalidValue {
            input: input.to_string(),
            kind: kind.to_string(),
        };
        match kind {
            ValueKind::Text => Ok(Self::Text(input.to_string())),
            ValueKind::Int => input.trim().parse().map(Self::Int).map_err(|_| err()),
            ValueKind::Float => input.trim().parse().map(Self::Float).map_err(|_| err()),
            ValueKind::Bool => input.trim().parse().map(Self::Bool).map_err(|_| err()),
        }
    }

    /// JSON rendering used by document mapping.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for SimpleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SimpleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for SimpleValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for SimpleValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for SimpleValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn kinds_and_accessors() {
        assert_eq!(SimpleValue::from("x").kind(), ValueKind::Text);
        assert_eq!(SimpleValue::from(3i64).as_int(), Some(3));
        assert_eq!(SimpleValue::from(3i64).as_float(), Some(3.0));
        assert_eq!(SimpleValue::from(true).as_bool(), Some(true));
        assert_eq!(SimpleValue::from("x").as_int(), None);
    }

    #[test]
    fn index_keys_are_kind_prefixed() {
        assert_ne!(
            SimpleValue::from("1").index_key(),
            SimpleValue::from(1i64).index_key()
        );
        assert_eq!(SimpleValue::from("Karl").index_key(), "t:Karl");
    }

    #[test]
    fn parse_as_kind() {
        assert_eq!(
            SimpleValue::parse_as(ValueKind::Int, "42").unwrap(),
            SimpleValue::Int(42)
        );
        assert_eq!(
            SimpleValue::parse_as(ValueKind::Bool, "true").unwrap(),
            SimpleValue::Bool(true)
        );
        let err = SimpleValue::parse_as(ValueKind::Int, "forty").unwrap_err();
        assert!(matches!(err, TypeError::InvalidValue { .. }));
    }

    #[test]
    fn json_rendering() {
        assert_eq!(SimpleValue::from("a").to_json(), serde_json::json!("a"));
        assert_eq!(SimpleValue::from(7i64).to_json(), serde_json::json!(7));
        assert_eq!(SimpleValue::from(false).to_json(), serde_json::json!(false));
    }

    proptest! {
        #[test]
        fn distinct_values_have_distinct_index_keys(a in any::<i64>(), b in any::<i64>()) {
            let ka = SimpleValue::Int(a).index_key();
            let kb = SimpleValue::Int(b).index_key();
            prop_assert_eq!(a == b, ka == kb);
        }

        #[test]
        fn text_index_key_never_matches_int(s in "[0-9]{1,8}") {
            let n: i64 = s.parse().unwrap();
            prop_assert_ne!(SimpleValue::Text(s).index_key(), SimpleValue::Int(n).index_key());
        }
    }
}
