use std::io::Cursor;

use plist::Dictionary;
use vaultbox_core::{
    record::reject_non_finite, DecodingError, Encoder, EncoderFormat, EncodingError, Record, Value,
};

use super::{check_supported, unsupported_on_decode};

/// Byte layout written by [`StructuredEncoder`]. Decoding accepts both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlistFormat {
    #[default]
    Binary,
    Xml,
}

/// Property-list encoder supporting every value kind, including byte blobs
/// and scalar roots.
#[derive(Debug, Clone, Default)]
pub struct StructuredEncoder {
    layout: PlistFormat,
}

impl StructuredEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: PlistFormat) -> Self {
        Self { layout }
    }
}

impl Encoder for StructuredEncoder {
    fn format(&self) -> EncoderFormat {
        EncoderFormat::Structured
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodingError> {
        check_supported(value, &reject_non_finite)?;

        let plist = to_plist(value);
        let mut buf = Vec::new();
        let written = match self.layout {
            PlistFormat::Binary => plist.to_writer_binary(&mut buf),
            PlistFormat::Xml => plist.to_writer_xml(&mut buf),
        };
        written.map_err(|e| EncodingError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodingError> {
        let plist = plist::Value::from_reader(Cursor::new(bytes))
            .map_err(|e| DecodingError::Malformed(e.to_string()))?;
        from_plist(plist, "$")
    }

    fn is_valid(&self, value: &Value) -> bool {
        value.find_unsupported(&reject_non_finite).is_none()
    }
}

fn to_plist(value: &Value) -> plist::Value {
    match value {
        Value::Bool(b) => plist::Value::Boolean(*b),
        Value::Integer(i) => plist::Value::Integer((*i).into()),
        Value::Real(r) => plist::Value::Real(*r),
        Value::String(s) => plist::Value::String(s.clone()),
        Value::Data(d) => plist::Value::Data(d.clone()),
        Value::Array(items) => plist::Value::Array(items.iter().map(to_plist).collect()),
        Value::Record(record) => {
            let mut dict = Dictionary::new();
            for (key, value) in record.iter() {
                dict.insert(key.clone(), to_plist(value));
            }
            plist::Value::Dictionary(dict)
        }
    }
}

fn from_plist(value: plist::Value, path: &str) -> Result<Value, DecodingError> {
    match value {
        plist::Value::Boolean(b) => Ok(Value::Bool(b)),
        plist::Value::Integer(i) => i
            .as_signed()
            .map(Value::Integer)
            .ok_or_else(|| unsupported_on_decode(path, "integer exceeds i64")),
        plist::Value::Real(r) if r.is_finite() => Ok(Value::Real(r)),
        plist::Value::Real(_) => Err(unsupported_on_decode(path, "non-finite real")),
        plist::Value::String(s) => Ok(Value::String(s)),
        plist::Value::Data(d) => Ok(Value::Data(d)),
        plist::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| from_plist(item, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        plist::Value::Dictionary(dict) => {
            let mut record = Record::new();
            for (key, value) in dict {
                let decoded = from_plist(value, &format!("{path}.{key}"))?;
                record.insert(key, decoded);
            }
            Ok(Value::Record(record))
        }
        plist::Value::Date(_) => Err(unsupported_on_decode(path, "date")),
        plist::Value::Uid(_) => Err(unsupported_on_decode(path, "uid")),
        _ => Err(unsupported_on_decode(path, "unknown property-list kind")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Record(
            Record::new()
                .with("name", "Alice")
                .with("age", 42)
                .with("ratio", 0.25)
                .with("admin", true)
                .with("avatar", Value::Data(vec![0, 159, 255]))
                .with(
                    "tags",
                    vec![Value::from("a"), Value::from(-7), Value::from(2.0)],
                )
                .with("nested", Record::new().with("deep", Record::new().with("x", 1))),
        )
    }

    #[test]
    fn binary_round_trip_preserves_every_kind() {
        let encoder = StructuredEncoder::new();
        let bytes = encoder.encode(&sample()).expect("encode");
        assert!(bytes.starts_with(b"bplist00"));
        assert_eq!(encoder.decode(&bytes).expect("decode"), sample());
    }

    #[test]
    fn xml_layout_round_trips_and_is_readable_by_default_encoder() {
        let xml = StructuredEncoder::with_layout(PlistFormat::Xml);
        let bytes = xml.encode(&sample()).expect("encode");
        assert!(String::from_utf8_lossy(&bytes).contains("<plist"));

        assert_eq!(StructuredEncoder::new().decode(&bytes).expect("decode"), sample());
    }

    #[test]
    fn scalar_roots_are_allowed() {
        let encoder = StructuredEncoder::new();
        let bytes = encoder.encode(&Value::from("just a string")).expect("encode");
        assert_eq!(encoder.decode(&bytes).expect("decode"), Value::from("just a string"));
    }

    #[test]
    fn nan_is_rejected_not_coerced() {
        let encoder = StructuredEncoder::new();
        let value = Value::Record(Record::new().with("score", f64::NAN));

        assert!(!encoder.is_valid(&value));
        let err = encoder.encode(&value).expect_err("nan must fail");
        assert_eq!(
            err,
            EncodingError::UnsupportedValue {
                path: "$.score".into(),
                reason: "non-finite real".into()
            }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = StructuredEncoder::new()
            .decode(b"bplist00 truncated")
            .expect_err("should fail");
        assert!(matches!(err, DecodingError::Malformed(_)));
    }

    #[test]
    fn dates_decode_as_unsupported() {
        let mut dict = Dictionary::new();
        dict.insert(
            "when".into(),
            plist::Value::Date(std::time::SystemTime::UNIX_EPOCH.into()),
        );
        let mut buf = Vec::new();
        plist::Value::Dictionary(dict)
            .to_writer_binary(&mut buf)
            .expect("write");

        let err = StructuredEncoder::new().decode(&buf).expect_err("date unsupported");
        assert!(matches!(err, DecodingError::UnsupportedValue { ref path, .. } if path == "$.when"));
    }
}
