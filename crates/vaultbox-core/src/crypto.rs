use std::fmt::Debug;

use crate::error::{DecryptError, EncryptError};

/// Holds key material and transforms bytes to and from cipher bytes.
/// Instances are immutable once built and shared behind `Arc`.
pub trait EncryptionService: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Encrypts with a fresh random IV which is embedded in the output.
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptError>;

    /// Encrypts with a caller-chosen IV that is *not* embedded in the output.
    /// Reusing an IV under the same key breaks confidentiality.
    fn encrypt_with_iv(&self, data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EncryptError>;

    /// Reverses [`EncryptionService::encrypt`].
    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, DecryptError>;

    /// Reverses [`EncryptionService::encrypt_with_iv`].
    fn decrypt_with_iv(&self, cipher: &[u8], iv: &[u8]) -> Result<Vec<u8>, DecryptError>;
}
