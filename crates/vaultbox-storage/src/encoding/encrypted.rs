use std::sync::Arc;

use vaultbox_core::{
    DecodingError, EncodingError, Encoder, EncoderFormat, EncryptionService, Value,
};
use zeroize::Zeroizing;

/// Encoder decorator: `encrypt(inner.encode(v))` on the way out,
/// `inner.decode(decrypt(bytes))` on the way back. A wrong key and corrupted
/// bytes both surface as [`DecodingError`].
#[derive(Debug, Clone)]
pub struct EncryptedEncoder {
    inner: Arc<dyn Encoder>,
    service: Arc<dyn EncryptionService>,
}

impl EncryptedEncoder {
    pub fn new(inner: Arc<dyn Encoder>, service: Arc<dyn EncryptionService>) -> Self {
        Self { inner, service }
    }

    pub fn service(&self) -> &Arc<dyn EncryptionService> {
        &self.service
    }
}

impl Encoder for EncryptedEncoder {
    fn format(&self) -> EncoderFormat {
        self.inner.format()
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodingError> {
        let plain = Zeroizing::new(self.inner.encode(value)?);
        Ok(self.service.encrypt(&plain)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodingError> {
        let plain = Zeroizing::new(self.service.decrypt(bytes)?);
        self.inner.decode(&plain)
    }

    fn is_valid(&self, value: &Value) -> bool {
        self.inner.is_valid(value)
    }
}

#[cfg(test)]
mod tests {
    use vaultbox_core::{DecryptError, Record};

    use super::*;
    use crate::{
        crypto::{test_passphrase_config, PassphraseEncryptionService},
        encoding::{StructuredEncoder, TextEncoder},
    };

    fn encrypted(passphrase: &str, inner: Arc<dyn Encoder>) -> EncryptedEncoder {
        let service = PassphraseEncryptionService::new(&test_passphrase_config(passphrase))
            .expect("derive");
        EncryptedEncoder::new(inner, Arc::new(service))
    }

    fn record() -> Value {
        Value::Record(
            Record::new()
                .with("username", "alice")
                .with("token", "s3cr3t-token")
                .with("raw", Value::Data(vec![9, 8, 7])),
        )
    }

    #[test]
    fn round_trip_with_same_config() {
        let encoder = encrypted("secret", Arc::new(StructuredEncoder::new()));
        let bytes = encoder.encode(&record()).expect("encode");
        assert!(
            !bytes.windows(12).any(|w| w == b"s3cr3t-token"),
            "plaintext must not leak into ciphertext"
        );

        let same = encrypted("secret", Arc::new(StructuredEncoder::new()));
        assert_eq!(same.decode(&bytes).expect("decode"), record());
    }

    #[test]
    fn wrong_passphrase_is_a_decoding_error() {
        let bytes = encrypted("secret", Arc::new(StructuredEncoder::new()))
            .encode(&record())
            .expect("encode");

        let err = encrypted("wrong", Arc::new(StructuredEncoder::new()))
            .decode(&bytes)
            .expect_err("wrong key must not decode");
        assert_eq!(err, DecodingError::Decryption(DecryptError::Mismatch));
    }

    #[test]
    fn corrupted_ciphertext_is_a_decoding_error() {
        let encoder = encrypted("secret", Arc::new(StructuredEncoder::new()));
        assert!(matches!(
            encoder.decode(b"short"),
            Err(DecodingError::Decryption(DecryptError::Truncated { .. }))
        ));
    }

    #[test]
    fn malformed_plaintext_surfaces_inner_error() {
        let encoder = encrypted("secret", Arc::new(StructuredEncoder::new()));
        let cipher = encoder.service().encrypt(b"bplist00 truncated").expect("encrypt");
        assert!(matches!(
            encoder.decode(&cipher),
            Err(DecodingError::Malformed(_))
        ));
    }

    #[test]
    fn inner_validation_is_preserved() {
        let encoder = encrypted("secret", Arc::new(TextEncoder::new()));
        assert_eq!(encoder.format(), EncoderFormat::Text);
        assert!(!encoder.is_valid(&record()));
        assert!(matches!(
            encoder.encode(&record()),
            Err(EncodingError::UnsupportedValue { .. })
        ));
    }
}
