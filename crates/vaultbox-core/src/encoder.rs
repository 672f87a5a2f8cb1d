use std::fmt::Debug;

use crate::{
    error::{DecodingError, EncodingError},
    record::Value,
};

/// Serialization layout selected for blob-backed stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EncoderFormat {
    /// Property-list layout, supports every value kind.
    #[default]
    Structured,
    /// JSON layout; rejects byte blobs and scalar roots.
    Text,
}

/// Bidirectional transform between values and bytes.
pub trait Encoder: Send + Sync + Debug {
    fn format(&self) -> EncoderFormat;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodingError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodingError>;

    /// True when `encode` would accept the value.
    fn is_valid(&self, value: &Value) -> bool;
}
