//! Encoder implementations: property list, JSON, and the encrypting decorator
//! that wraps either of them.

mod encrypted;
mod json;
mod property_list;

use std::sync::Arc;

use vaultbox_core::{DecodingError, Encoder, EncoderFormat, EncodingError, Value};

pub use self::encrypted::EncryptedEncoder;
pub use self::json::TextEncoder;
pub use self::property_list::{PlistFormat, StructuredEncoder};

/// Plain encoder for a configured format.
pub fn encoder_for(format: EncoderFormat) -> Arc<dyn Encoder> {
    match format {
        EncoderFormat::Structured => Arc::new(StructuredEncoder::new()),
        EncoderFormat::Text => Arc::new(TextEncoder::new()),
    }
}

fn check_supported<F>(value: &Value, accept: &F) -> Result<(), EncodingError>
where
    F: Fn(&Value) -> Result<(), &'static str>,
{
    match value.find_unsupported(accept) {
        Some((path, reason)) => Err(EncodingError::UnsupportedValue {
            path,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn unsupported_on_decode(path: &str, reason: &str) -> DecodingError {
    DecodingError::UnsupportedValue {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
