//! Task arguments.
//!
//! On the wire an argument is `{"name": ..., "type": ..., "value": ...}`.
//! The `type` tag is explicit so a receiver never has to infer the concrete
//! representation from the JSON value: decoding checks the value against the
//! declared tag and fails if they disagree.
//!
//! JSON has no NaN or infinity, so non-finite floats cannot be encoded:
//! serializing such an argument is an error rather than a silent `null`.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Decoding an argument against its declared type tag failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("unsupported argument type `{0}`")]
    UnsupportedType(String),

    #[error("value {value} does not fit declared type `{type_tag}`")]
    TypeMismatch { type_tag: String, value: Value },

    #[error("non-finite `{type_tag}` value has no JSON encoding")]
    NonFinite { type_tag: &'static str },
}

/// A typed argument value. The variant is the `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint(u64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    BoolSlice(Vec<bool>),
    Int64Slice(Vec<i64>),
    Uint64Slice(Vec<u64>),
    Float64Slice(Vec<f64>),
    StringSlice(Vec<String>),
}

impl ArgValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Int8(_) => "int8",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Uint(_) => "uint",
            Self::Uint8(_) => "uint8",
            Self::Uint16(_) => "uint16",
            Self::Uint32(_) => "uint32",
            Self::Uint64(_) => "uint64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::BoolSlice(_) => "[]bool",
            Self::Int64Slice(_) => "[]int64",
            Self::Uint64Slice(_) => "[]uint64",
            Self::Float64Slice(_) => "[]float64",
            Self::StringSlice(_) => "[]string",
        }
    }

    /// Decode a JSON value as the representation named by `type_tag`.
    ///
    /// Integers must be in range for the tagged width; no lossy coercion
    /// between strings and numbers is attempted.
    pub fn decode(type_tag: &str, value: Value) -> Result<Self, ArgError> {
        let decoded = match type_tag {
            "bool" => value.as_bool().map(Self::Bool),
            "int" => signed(&value).map(Self::Int),
            "int8" => signed(&value).map(Self::Int8),
            "int16" => signed(&value).map(Self::Int16),
            "int32" => signed(&value).map(Self::Int32),
            "int64" => signed(&value).map(Self::Int64),
            "uint" => unsigned(&value).map(Self::Uint),
            "uint8" => unsigned(&value).map(Self::Uint8),
            "uint16" => unsigned(&value).map(Self::Uint16),
            "uint32" => unsigned(&value).map(Self::Uint32),
            "uint64" => unsigned(&value).map(Self::Uint64),
            "float32" => value
                .as_f64()
                .filter(|f| f.abs() <= f64::from(f32::MAX))
                .map(|f| Self::Float32(f as f32)),
            "float64" => value.as_f64().map(Self::Float64),
            "string" => value.as_str().map(|s| Self::String(s.to_string())),
            "[]bool" => slice(&value, Value::as_bool).map(Self::BoolSlice),
            "[]int64" => slice(&value, Value::as_i64).map(Self::Int64Slice),
            "[]uint64" => slice(&value, Value::as_u64).map(Self::Uint64Slice),
            "[]float64" => slice(&value, Value::as_f64).map(Self::Float64Slice),
            "[]string" => {
                slice(&value, |v| v.as_str().map(str::to_string)).map(Self::StringSlice)
            }
            other => return Err(ArgError::UnsupportedType(other.to_string())),
        };

        decoded.ok_or_else(|| ArgError::TypeMismatch {
            type_tag: type_tag.to_string(),
            value,
        })
    }

    /// Encode as the JSON value carried next to the type tag.
    pub fn to_json(&self) -> Result<Value, ArgError> {
        let non_finite = || ArgError::NonFinite {
            type_tag: self.type_tag(),
        };
        let value = match self {
            Self::Bool(b) => Value::from(*b),
            Self::Int(n) | Self::Int64(n) => Value::from(*n),
            Self::Int8(n) => Value::from(*n),
            Self::Int16(n) => Value::from(*n),
            Self::Int32(n) => Value::from(*n),
            Self::Uint(n) | Self::Uint64(n) => Value::from(*n),
            Self::Uint8(n) => Value::from(*n),
            Self::Uint16(n) => Value::from(*n),
            Self::Uint32(n) => Value::from(*n),
            Self::Float32(f) if f.is_finite() => Value::from(f64::from(*f)),
            Self::Float64(f) if f.is_finite() => Value::from(*f),
            Self::Float32(_) | Self::Float64(_) => return Err(non_finite()),
            Self::String(s) => Value::from(s.as_str()),
            Self::BoolSlice(v) => Value::from(v.clone()),
            Self::Int64Slice(v) => Value::from(v.clone()),
            Self::Uint64Slice(v) => Value::from(v.clone()),
            Self::Float64Slice(v) if v.iter().all(|f| f.is_finite()) => Value::from(v.clone()),
            Self::Float64Slice(_) => return Err(non_finite()),
            Self::StringSlice(v) => Value::from(v.clone()),
        };
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant that fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(n) | Self::Int64(n) => Some(n),
            Self::Int8(n) => Some(n.into()),
            Self::Int16(n) => Some(n.into()),
            Self::Int32(n) => Some(n.into()),
            Self::Uint(n) | Self::Uint64(n) => i64::try_from(n).ok(),
            Self::Uint8(n) => Some(n.into()),
            Self::Uint16(n) => Some(n.into()),
            Self::Uint32(n) => Some(n.into()),
            _ => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

fn signed<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    value.as_i64().and_then(|n| T::try_from(n).ok())
}

fn unsigned<T: TryFrom<u64>>(value: &Value) -> Option<T> {
    value.as_u64().and_then(|n| T::try_from(n).ok())
}

fn slice<T>(value: &Value, item: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    value.as_array()?.iter().map(item).collect()
}

/// One named invocation parameter. Immutable once built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawArg")]
pub struct Arg {
    name: String,
    value: ArgValue,
}

impl Arg {
    pub fn new(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &'static str {
        self.value.type_tag()
    }

    pub fn value(&self) -> &ArgValue {
        &self.value
    }
}

impl Serialize for Arg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawArg::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// Wire shape of [`Arg`]. Legacy producers spell the keys capitalised.
#[derive(Serialize, Deserialize)]
struct RawArg {
    #[serde(default, alias = "Name")]
    name: String,
    #[serde(rename = "type", alias = "Type")]
    type_tag: String,
    #[serde(alias = "Value")]
    value: Value,
}

impl TryFrom<RawArg> for Arg {
    type Error = ArgError;

    fn try_from(raw: RawArg) -> Result<Self, Self::Error> {
        Ok(Self {
            name: raw.name,
            value: ArgValue::decode(&raw.type_tag, raw.value)?,
        })
    }
}

impl TryFrom<&Arg> for RawArg {
    type Error = ArgError;

    fn try_from(arg: &Arg) -> Result<Self, Self::Error> {
        Ok(Self {
            name: arg.name.clone(),
            type_tag: arg.value.type_tag().to_string(),
            value: arg.value.to_json()?,
        })
    }
}
