//! Scalar values carried by parameters, clauses and SQL literals

use std::fmt;
use serde::{Serialize, Deserialize};

/// A single scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Whether this value can be used as a numeric bound
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Integer(_) => true,
            Value::Float(f) => f.is_finite(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render as a SQL literal
    pub fn to_sql(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(true) => "TRUE".to_string(),
            Value::Boolean(false) => "FALSE".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Integer(v as i64)
                }
            }
        )*
    }
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literals() {
        assert_eq!(Value::from(7).to_sql(), "7");
        assert_eq!(Value::from(2.5).to_sql(), "2.5");
        assert_eq!(Value::from(3.0).to_sql(), "3.0");
        assert_eq!(Value::from("O'Hare").to_sql(), "'O''Hare'");
        assert_eq!(Value::Null.to_sql(), "NULL");
        assert_eq!(Value::from(false).to_sql(), "FALSE");
    }

    #[test]
    fn test_numeric_check() {
        assert!(Value::from(1).is_numeric());
        assert!(Value::from(1.5).is_numeric());
        assert!(!Value::Float(f64::NAN).is_numeric());
        assert!(!Value::from("1").is_numeric());
        assert!(!Value::Null.is_numeric());
    }
}
