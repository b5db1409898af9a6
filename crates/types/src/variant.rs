//! Sum type for filter results and RPC parameters.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, Result};

/// Dynamically-typed value produced by terminal filters and carried on the
/// remote protocol wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer, used for byte counts.
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 string, used for digest hex and etags.
    String(String),
    /// Ordered list.
    List(Vec<Variant>),
    /// String-keyed map.
    Map(BTreeMap<String, Variant>),
}

impl Variant {
    /// Returns the boolean value or `AssertError` on kind mismatch.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(value) => Ok(*value),
            _ => Err(mismatch("bool", self)),
        }
    }

    /// Returns the signed integer value.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(value) => Ok(*value),
            _ => Err(mismatch("int", self)),
        }
    }

    /// Returns the unsigned integer value.
    pub fn as_uint(&self) -> Result<u64> {
        match self {
            Self::UInt(value) => Ok(*value),
            _ => Err(mismatch("uint", self)),
        }
    }

    /// Returns the string value.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(value) => Ok(value),
            _ => Err(mismatch("string", self)),
        }
    }

    /// Returns the list value.
    pub fn as_list(&self) -> Result<&[Variant]> {
        match self {
            Self::List(value) => Ok(value),
            _ => Err(mismatch("list", self)),
        }
    }

    /// Converts to the JSON representation used on the RPC wire.
    ///
    /// `Bytes` is not representable in JSON and is rejected; binary payloads
    /// travel through the chunk sub-protocol instead.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Int(value) => serde_json::Value::from(*value),
            Self::UInt(value) => serde_json::Value::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::format("non-finite float is not representable"))?,
            Self::Bytes(_) => {
                return Err(Error::assert("bytes variant is not representable as json"))
            }
            Self::String(value) => serde_json::Value::String(value.clone()),
            Self::List(value) => serde_json::Value::Array(
                value.iter().map(Variant::to_json).collect::<Result<_>>()?,
            ),
            Self::Map(value) => serde_json::Value::Object(
                value
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Builds a variant from a JSON value received on the RPC wire.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => {
                return Err(Error::format("null is not a valid variant"))
            }
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(value) => {
                if let Some(value) = value.as_u64() {
                    Self::UInt(value)
                } else if let Some(value) = value.as_i64() {
                    Self::Int(value)
                } else if let Some(value) = value.as_f64() {
                    Self::Float(value)
                } else {
                    return Err(Error::format(format!("unrepresentable number '{value}'")));
                }
            }
            serde_json::Value::String(value) => Self::String(value.clone()),
            serde_json::Value::Array(value) => {
                Self::List(value.iter().map(Self::from_json).collect::<Result<_>>()?)
            }
            serde_json::Value::Object(value) => Self::Map(
                value
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), Self::from_json(value)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

fn mismatch(expected: &str, actual: &Variant) -> Error {
    Error::new(
        ErrorKind::Assert,
        format!("expected {expected} variant but found {actual:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_enforce_kind() {
        assert!(Variant::Bool(true).as_bool().expect("bool"));
        assert_eq!(Variant::UInt(42).as_uint().expect("uint"), 42);
        assert_eq!(Variant::String("ab".into()).as_str().expect("str"), "ab");

        let error = Variant::UInt(1).as_bool().expect_err("kind mismatch");
        assert_eq!(error.kind(), ErrorKind::Assert);
    }

    #[test]
    fn json_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("etag".to_string(), Variant::String("abc".into()));
        map.insert("part".to_string(), Variant::UInt(1));
        let variant = Variant::List(vec![Variant::Map(map), Variant::Bool(false)]);

        let json = variant.to_json().expect("to json");
        assert_eq!(Variant::from_json(&json).expect("from json"), variant);
    }

    #[test]
    fn bytes_rejected_on_wire() {
        let error = Variant::Bytes(vec![1, 2]).to_json().expect_err("no json bytes");
        assert_eq!(error.kind(), ErrorKind::Assert);
    }
}
