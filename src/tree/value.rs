//! Parameter types and values

use std::fmt;

use crate::error::{Error, Result};

/// Semantic type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    UnsignedInt,
    String,
    /// One of a fixed set of wire names
    Enum(&'static [&'static str]),
}

/// A parameter value as stored in a snapshot or read from hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    UnsignedInt(u64),
    String(String),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::UnsignedInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::UnsignedInt(u) => write!(f, "{}", u),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<u64> for ParamValue {
    fn from(u: u64) -> Self {
        ParamValue::UnsignedInt(u)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<&ParamValue> for serde_json::Value {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Int(i) => serde_json::Value::from(*i),
            ParamValue::UnsignedInt(u) => serde_json::Value::from(*u),
            ParamValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Parse a boolean the way management servers send them
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

impl ParamType {
    /// Value a fresh parameter of this type starts with
    pub fn default_value(&self) -> ParamValue {
        match self {
            ParamType::Bool => ParamValue::Bool(false),
            ParamType::Int => ParamValue::Int(0),
            ParamType::UnsignedInt => ParamValue::UnsignedInt(0),
            ParamType::String => ParamValue::String(String::new()),
            ParamType::Enum(names) => {
                ParamValue::String(names.first().copied().unwrap_or_default().to_string())
            }
        }
    }

    /// Convert a wire string into a typed value, rejecting shape errors
    pub fn parse(&self, name: &str, raw: &str) -> Result<ParamValue> {
        match self {
            ParamType::Bool => parse_bool(raw)
                .map(ParamValue::Bool)
                .ok_or_else(|| Error::validation(name, raw, "not a boolean")),
            ParamType::Int => raw
                .trim()
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| Error::validation(name, raw, "not an integer")),
            ParamType::UnsignedInt => raw
                .trim()
                .parse::<u64>()
                .map(ParamValue::UnsignedInt)
                .map_err(|_| Error::validation(name, raw, "not an unsigned integer")),
            ParamType::String => Ok(ParamValue::String(raw.to_string())),
            ParamType::Enum(names) => {
                if names.contains(&raw) {
                    Ok(ParamValue::String(raw.to_string()))
                } else {
                    Err(Error::validation(
                        name,
                        raw,
                        format!("must be one of {}", names.join(", ")),
                    ))
                }
            }
        }
    }
}
