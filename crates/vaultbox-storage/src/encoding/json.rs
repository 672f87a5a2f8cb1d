use serde_json::{Map, Number};
use vaultbox_core::{
    record::reject_non_finite, DecodingError, Encoder, EncoderFormat, EncodingError, Record, Value,
};

use super::{check_supported, unsupported_on_decode};

/// JSON encoder. The root must be a record or an array, and byte blobs have
/// no JSON representation.
#[derive(Debug, Clone, Default)]
pub struct TextEncoder;

impl TextEncoder {
    pub fn new() -> Self {
        Self
    }
}

fn accept(value: &Value) -> Result<(), &'static str> {
    reject_non_finite(value)?;
    match value {
        Value::Data(_) => Err("byte data is not representable as JSON"),
        _ => Ok(()),
    }
}

fn check_root(value: &Value) -> Result<(), EncodingError> {
    match value {
        Value::Record(_) | Value::Array(_) => Ok(()),
        other => Err(EncodingError::UnsupportedRoot { kind: other.kind() }),
    }
}

impl Encoder for TextEncoder {
    fn format(&self) -> EncoderFormat {
        EncoderFormat::Text
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodingError> {
        check_root(value)?;
        check_supported(value, &accept)?;
        serde_json::to_vec(&to_json(value)?).map_err(|e| EncodingError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodingError> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodingError::Malformed(e.to_string()))?;
        match json {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => from_json(json, "$"),
            other => Err(DecodingError::UnexpectedRoot {
                kind: json_kind(&other),
            }),
        }
    }

    fn is_valid(&self, value: &Value) -> bool {
        check_root(value).is_ok() && value.find_unsupported(&accept).is_none()
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, EncodingError> {
    Ok(match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Real(r) => Number::from_f64(*r)
            .map(serde_json::Value::Number)
            .ok_or_else(|| EncodingError::Serialization(format!("cannot encode real {r}")))?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Data(_) => {
            return Err(EncodingError::Serialization(
                "byte data is not representable as JSON".into(),
            ))
        }
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        }
        Value::Record(record) => {
            let mut map = Map::new();
            for (key, value) in record.iter() {
                map.insert(key.clone(), to_json(value)?);
            }
            serde_json::Value::Object(map)
        }
    })
}

fn from_json(value: serde_json::Value, path: &str) -> Result<Value, DecodingError> {
    match value {
        serde_json::Value::Null => Err(unsupported_on_decode(path, "null")),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if n.is_u64() {
                Err(unsupported_on_decode(path, "integer exceeds i64"))
            } else {
                n.as_f64()
                    .map(Value::Real)
                    .ok_or_else(|| unsupported_on_decode(path, "unrepresentable number"))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| from_json(item, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_json::Value::Object(map) => {
            let mut record = Record::new();
            for (key, value) in map {
                let decoded = from_json(value, &format!("{path}.{key}"))?;
                record.insert(key, decoded);
            }
            Ok(Value::Record(record))
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
