use serde::{Deserialize, Serialize};
use std::fmt;

/// Dynamically typed cell or method output.
///
/// `Null` is the explicit missing marker used in result layers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(#[serde(with = "number")] f64),
    Text(String),
    Vector(Vec<Value>),
}

impl Value {
    /// True for `Null` and for `NaN` produced by a failed computation. Infinities are concrete values.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) if !n.is_nan() => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view of a vector, with `NaN` standing in for missing or non-numeric cells.
    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        self.as_vector()
            .map(|items| items.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Vector(_) => "vector",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NA"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Vector(items) => {
                // Long vectors are summarised, the full content lives in the dataset
                if items.len() > 4 {
                    write!(f, "<vector of {}>", items.len())
                } else {
                    let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                    write!(f, "[{}]", parts.join(", "))
                }
            }
        }
    }
}

/// JSON has no literal for non-finite floats: they are written as
/// `{"float": "inf"}`, `{"float": "-inf"}` or `{"float": "NaN"}` so a saved
/// `inf` cell does not come back as the missing marker.
mod number {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    #[serde(untagged)]
    enum Repr<'a> {
        Finite(f64),
        Special { float: &'a str },
    }

    pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = if n.is_finite() {
            Repr::Finite(*n)
        } else if n.is_nan() {
            Repr::Special { float: "NaN" }
        } else if *n > 0.0 {
            Repr::Special { float: "inf" }
        } else {
            Repr::Special { float: "-inf" }
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Owned {
            Finite(f64),
            Special { float: String },
        }

        match Owned::deserialize(deserializer)? {
            Owned::Finite(n) => Ok(n),
            Owned::Special { float } => match float.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!("unknown float literal {}", other))),
            },
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
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

impl From<Vec<f64>> for Value {
    fn from(items: Vec<f64>) -> Self {
        Value::Vector(items.into_iter().map(Value::Number).collect())
    }
}

impl From<Vec<bool>> for Value {
    fn from(items: Vec<bool>) -> Self {
        Value::Vector(items.into_iter().map(Value::Bool).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Vector(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(item: Option<T>) -> Self {
        item.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_detection() {
        assert!(Value::Null.is_missing());
        assert!(Value::Number(f64::NAN).is_missing());
        assert!(!Value::Number(0.0).is_missing());
        assert!(!Value::Bool(false).is_missing());
    }

    #[test]
    fn test_numeric_view_of_vector() {
        let v = Value::Vector(vec![Value::Number(0.5), Value::Null, Value::Bool(true)]);
        let numbers = v.as_numbers().unwrap();

        assert_eq!(numbers[0], 0.5);
        assert!(numbers[1].is_nan());
        assert_eq!(numbers[2], 1.0);
        assert!(Value::Number(1.0).as_numbers().is_none());
    }

    #[test]
    fn test_json_shape() {
        let v = Value::Vector(vec![Value::Number(1.0), Value::Null, Value::from("a")]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"[1.0,null,"a"]"#);

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_non_finite_numbers_survive_json() {
        let v = Value::from(vec![f64::INFINITY, f64::NEG_INFINITY, 0.5]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"[{"float":"inf"},{"float":"-inf"},0.5]"#);

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);

        let nan: Value = serde_json::from_str(r#"{"float":"NaN"}"#).unwrap();
        assert!(nan.is_missing());
        assert!(serde_json::from_str::<Value>(r#"{"float":"huge"}"#).is_err());

        // Plain strings stay text
        assert_eq!(serde_json::from_str::<Value>(r#""inf""#).unwrap(), Value::from("inf"));
    }
}
