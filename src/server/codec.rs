//! DynamicValue encoding
//!
//! Terraform sends values as msgpack, with unknown values as extension type
//! 0. Stored state handed to UpgradeResourceState is JSON.

use crate::provider::{Schema, Value};
use crate::server::proto::tfplugin6::DynamicValue;
use std::collections::BTreeMap;

/// msgpack extension type Terraform uses for unknown values
const UNKNOWN_EXT_TYPE: i8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Msgpack(String),
    Json(String),
    /// Valid encoding, but a shape this provider does not declare
    Unsupported(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Msgpack(msg) => write!(f, "invalid msgpack value: {}", msg),
            CodecError::Json(msg) => write!(f, "invalid JSON value: {}", msg),
            CodecError::Unsupported(msg) => write!(f, "unsupported value: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Decode a DynamicValue; an absent or empty one is null
pub fn decode(value: Option<&DynamicValue>) -> Result<Value, CodecError> {
    match value {
        Some(v) if !v.msgpack.is_empty() => decode_msgpack(&v.msgpack),
        Some(v) if !v.json.is_empty() => decode_json(&v.json),
        _ => Ok(Value::Null),
    }
}

/// Encode as a msgpack DynamicValue
pub fn encode(value: &Value) -> Result<DynamicValue, CodecError> {
    Ok(DynamicValue {
        msgpack: encode_msgpack(value)?,
        json: Vec::new(),
    })
}

pub fn decode_msgpack(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut cursor = bytes;
    let raw = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| CodecError::Msgpack(e.to_string()))?;
    from_msgpack(raw)
}

pub fn encode_msgpack(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &to_msgpack(value))
        .map_err(|e| CodecError::Msgpack(e.to_string()))?;
    Ok(buf)
}

fn from_msgpack(raw: rmpv::Value) -> Result<Value, CodecError> {
    Ok(match raw {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => Value::Number(
            i.as_i64()
                .ok_or_else(|| CodecError::Unsupported(format!("integer {} out of range", i)))?,
        ),
        rmpv::Value::F32(f) => from_float(f64::from(f))?,
        rmpv::Value::F64(f) => from_float(f)?,
        rmpv::Value::String(s) => Value::String(
            s.into_str()
                .ok_or_else(|| CodecError::Msgpack("string is not UTF-8".to_string()))?,
        ),
        rmpv::Value::Binary(_) => {
            return Err(CodecError::Unsupported("binary value".to_string()));
        }
        rmpv::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_msgpack)
                .collect::<Result<_, _>>()?,
        ),
        rmpv::Value::Map(entries) => {
            let mut attrs = BTreeMap::new();
            for (key, value) in entries {
                let key = match key {
                    rmpv::Value::String(s) => s.into_str().ok_or_else(|| {
                        CodecError::Msgpack("object key is not UTF-8".to_string())
                    })?,
                    other => {
                        return Err(CodecError::Unsupported(format!(
                            "object key {} is not a string",
                            other
                        )))
                    }
                };
                attrs.insert(key, from_msgpack(value)?);
            }
            Value::Object(attrs)
        }
        rmpv::Value::Ext(_, _) => Value::Unknown,
    })
}

fn from_float(f: f64) -> Result<Value, CodecError> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Ok(Value::Number(f as i64))
    } else {
        Err(CodecError::Unsupported(format!("non-integer number {}", f)))
    }
}

fn to_msgpack(value: &Value) -> rmpv::Value {
    match value {
        Value::Null => rmpv::Value::Nil,
        Value::Unknown => rmpv::Value::Ext(UNKNOWN_EXT_TYPE, vec![0]),
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::Number(n) => rmpv::Value::from(*n),
        Value::String(s) => rmpv::Value::from(s.as_str()),
        Value::List(items) => rmpv::Value::Array(items.iter().map(to_msgpack).collect()),
        Value::Object(attrs) => rmpv::Value::Map(
            attrs
                .iter()
                .map(|(k, v)| (rmpv::Value::from(k.as_str()), to_msgpack(v)))
                .collect(),
        ),
    }
}

pub fn decode_json(bytes: &[u8]) -> Result<Value, CodecError> {
    let raw: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))?;
    from_json(raw)
}

fn from_json(raw: serde_json::Value) -> Result<Value, CodecError> {
    Ok(match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Number(i),
            None => from_float(n.as_f64().unwrap_or(f64::NAN))?,
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_json)
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, from_json(v)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

/// Keep only the schema's attributes, adding missing ones as null
pub fn conform_to_schema(value: &Value, schema: &Schema) -> Value {
    Value::object(
        schema
            .attribute_names()
            .map(|name| (name, value.get(name).clone())),
    )
}
