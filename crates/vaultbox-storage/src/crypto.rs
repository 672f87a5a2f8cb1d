//! AES-256-GCM encryption services.
//!
//! Both variants share [`AesGcmCipher`]; they differ only in where the key
//! comes from:
//! - [`PassphraseEncryptionService`] derives it with Argon2id once, at
//!   construction. Derivation is slow; the key-service registry caches the
//!   resulting services by name.
//! - [`KeystoreEncryptionService`] loads it from a [`SecureKeyStore`], creating
//!   and persisting a random key on first use.
//!
//! Ciphertext from [`EncryptionService::encrypt`] is `IV || ciphertext || tag`.

use std::{fmt, time::Instant};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info, instrument};
use vaultbox_core::{
    ConfigError, DecryptError, EncryptError, EncryptionService, KeystoreCryptoConfig,
    PassphraseCryptoConfig,
};
use zeroize::Zeroizing;

use crate::key_store::SecureKeyStore;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const SALT_LEN: usize = 32;

/// Random bytes from the OS RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Fresh salt suitable for [`PassphraseCryptoConfig`].
pub fn random_salt() -> Vec<u8> {
    random_bytes(SALT_LEN)
}

pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Symmetric AES-256-GCM cipher over a fixed key.
pub struct AesGcmCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl AesGcmCipher {
    pub fn new(key: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self { key }
    }

    fn build(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptError> {
        let iv = random_iv();
        let sealed = self.encrypt_with_iv(data, &iv)?;
        let mut out = Vec::with_capacity(IV_LEN + sealed.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn encrypt_with_iv(&self, data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EncryptError> {
        if iv.len() != IV_LEN {
            return Err(EncryptError::InvalidIv {
                expected: IV_LEN,
                actual: iv.len(),
            });
        }
        self.build()
            .encrypt(Nonce::from_slice(iv), data)
            .map_err(|_| EncryptError::Cipher)
    }

    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if cipher.len() < IV_LEN + TAG_LEN {
            return Err(DecryptError::Truncated { len: cipher.len() });
        }
        let (iv, sealed) = cipher.split_at(IV_LEN);
        self.decrypt_with_iv(sealed, iv)
    }

    pub fn decrypt_with_iv(&self, cipher: &[u8], iv: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if iv.len() != IV_LEN {
            return Err(DecryptError::InvalidIv {
                expected: IV_LEN,
                actual: iv.len(),
            });
        }
        if cipher.len() < TAG_LEN {
            return Err(DecryptError::Truncated { len: cipher.len() });
        }
        self.build()
            .decrypt(Nonce::from_slice(iv), cipher)
            .map_err(|_| DecryptError::Mismatch)
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

/// Encryption service keyed by an Argon2id derivation of a passphrase.
#[derive(Debug)]
pub struct PassphraseEncryptionService {
    name: String,
    cipher: AesGcmCipher,
}

impl PassphraseEncryptionService {
    /// Validates the config and derives the key. CPU-bound; expect this to
    /// take a noticeable amount of time with production parameters.
    #[instrument(skip_all, fields(name = tracing::field::Empty))]
    pub fn new(config: &PassphraseCryptoConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = config.registry_key();
        tracing::Span::current().record("name", name.as_str());

        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| ConfigError::InvalidField {
            field: "kdf",
            reason: format!("invalid Argon2 params: {e}"),
        })?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let started = Instant::now();
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(config.passphrase().as_bytes(), &config.salt, &mut key[..])
            .map_err(|e| ConfigError::InvalidField {
                field: "kdf",
                reason: format!("Argon2id derivation failed: {e}"),
            })?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "derived passphrase key"
        );

        Ok(Self {
            name,
            cipher: AesGcmCipher::new(key),
        })
    }
}

impl EncryptionService for PassphraseEncryptionService {
    fn name(&self) -> &str {
        &self.name
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptError> {
        self.cipher.encrypt(data)
    }

    fn encrypt_with_iv(&self, data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EncryptError> {
        self.cipher.encrypt_with_iv(data, iv)
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, DecryptError> {
        self.cipher.decrypt(cipher)
    }

    fn decrypt_with_iv(&self, cipher: &[u8], iv: &[u8]) -> Result<Vec<u8>, DecryptError> {
        self.cipher.decrypt_with_iv(cipher, iv)
    }
}

/// Encryption service whose key lives in the platform secure key store.
/// The key is bound to that store, not to any configuration value.
#[derive(Debug)]
pub struct KeystoreEncryptionService {
    name: String,
    cipher: AesGcmCipher,
}

impl KeystoreEncryptionService {
    #[instrument(skip_all, fields(alias = %config.alias))]
    pub fn new(
        config: &KeystoreCryptoConfig,
        key_store: &dyn SecureKeyStore,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let keystore_err = |e: crate::key_store::KeyStoreError| ConfigError::Keystore(e.to_string());
        let key = match key_store.retrieve(&config.alias).map_err(keystore_err)? {
            Some(bytes) => {
                if bytes.len() != KEY_LEN {
                    return Err(ConfigError::Keystore(format!(
                        "expected {KEY_LEN} key bytes under `{}`, got {}",
                        config.alias,
                        bytes.len()
                    )));
                }
                let bytes = Zeroizing::new(bytes);
                let mut key = Zeroizing::new([0u8; KEY_LEN]);
                key.copy_from_slice(&bytes);
                debug!("loaded existing key");
                key
            }
            None => {
                let mut key = Zeroizing::new([0u8; KEY_LEN]);
                OsRng.fill_bytes(&mut key[..]);
                key_store
                    .store(&config.alias, key.as_slice())
                    .map_err(keystore_err)?;
                info!("generated and stored new key");
                key
            }
        };

        Ok(Self {
            name: config.registry_key(),
            cipher: AesGcmCipher::new(key),
        })
    }
}

impl EncryptionService for KeystoreEncryptionService {
    fn name(&self) -> &str {
        &self.name
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptError> {
        self.cipher.encrypt(data)
    }

    fn encrypt_with_iv(&self, data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EncryptError> {
        self.cipher.encrypt_with_iv(data, iv)
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, DecryptError> {
        self.cipher.decrypt(cipher)
    }

    fn decrypt_with_iv(&self, cipher: &[u8], iv: &[u8]) -> Result<Vec<u8>, DecryptError> {
        self.cipher.decrypt_with_iv(cipher, iv)
    }
}

/// Cheap Argon2 parameters so tests do not spend seconds per derivation.
#[cfg(test)]
pub(crate) fn test_passphrase_config(passphrase: &str) -> PassphraseCryptoConfig {
    PassphraseCryptoConfig::new(passphrase, b"0123456789abcdef".to_vec())
        .with_iterations(1)
        .with_memory_kib(64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_store::InMemoryKeyStore;

    #[test]
    fn round_trip_with_embedded_iv() {
        let service = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        let cipher = service.encrypt(b"hello-vault").expect("encrypt");

        assert_eq!(cipher.len(), IV_LEN + b"hello-vault".len() + TAG_LEN);
        assert_ne!(&cipher[IV_LEN..IV_LEN + 11], b"hello-vault");
        assert_eq!(service.decrypt(&cipher).expect("decrypt"), b"hello-vault");
    }

    #[test]
    fn random_iv_makes_ciphertexts_differ() {
        let service = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        let a = service.encrypt(b"same").expect("encrypt");
        let b = service.encrypt(b"same").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn explicit_iv_is_deterministic_and_not_embedded() {
        let service = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        let iv = random_iv();
        let a = service.encrypt_with_iv(b"payload", &iv).expect("encrypt");
        let b = service.encrypt_with_iv(b"payload", &iv).expect("encrypt");

        assert_eq!(a, b);
        assert_eq!(a.len(), b"payload".len() + TAG_LEN);
        assert_eq!(service.decrypt_with_iv(&a, &iv).expect("decrypt"), b"payload");
    }

    #[test]
    fn rejects_wrong_iv_length() {
        let service = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        assert_eq!(
            service.encrypt_with_iv(b"x", &[0u8; 8]),
            Err(EncryptError::InvalidIv {
                expected: IV_LEN,
                actual: 8
            })
        );
        assert!(matches!(
            service.decrypt_with_iv(&[0u8; 32], &[0u8; 16]),
            Err(DecryptError::InvalidIv { .. })
        ));
    }

    #[test]
    fn same_config_derives_interoperable_key() {
        let a = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        let b = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        let cipher = a.encrypt(b"shared").expect("encrypt");
        assert_eq!(b.decrypt(&cipher).expect("decrypt"), b"shared");
    }

    #[test]
    fn wrong_passphrase_is_a_mismatch() {
        let right = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        let wrong = PassphraseEncryptionService::new(&test_passphrase_config("wrong"))
            .expect("derive");
        let cipher = right.encrypt(b"data").expect("encrypt");
        assert_eq!(wrong.decrypt(&cipher), Err(DecryptError::Mismatch));
    }

    #[test]
    fn truncated_and_tampered_input_fail() {
        let service = PassphraseEncryptionService::new(&test_passphrase_config("secret"))
            .expect("derive");
        assert_eq!(
            service.decrypt(&[1, 2, 3]),
            Err(DecryptError::Truncated { len: 3 })
        );

        let mut cipher = service.encrypt(b"data").expect("encrypt");
        let last = cipher.len() - 1;
        cipher[last] ^= 0x01;
        assert_eq!(service.decrypt(&cipher), Err(DecryptError::Mismatch));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let err = PassphraseEncryptionService::new(&PassphraseCryptoConfig::new(
            "secret",
            b"short".to_vec(),
        ))
        .expect_err("salt too short");
        assert!(matches!(err, ConfigError::InvalidField { field: "salt", .. }));
    }

    #[test]
    fn keystore_service_generates_then_reuses_key() {
        let key_store = InMemoryKeyStore::new();
        let config = KeystoreCryptoConfig::new("device-key");

        let first = KeystoreEncryptionService::new(&config, &key_store).expect("create");
        let stored = key_store
            .retrieve("device-key")
            .expect("retrieve")
            .expect("key persisted");
        assert_eq!(stored.len(), KEY_LEN);

        let second = KeystoreEncryptionService::new(&config, &key_store).expect("reload");
        let cipher = first.encrypt(b"bound to device").expect("encrypt");
        assert_eq!(second.decrypt(&cipher).expect("decrypt"), b"bound to device");
        assert_eq!(first.name(), "keystore:device-key");
    }

    #[test]
    fn keystore_service_rejects_malformed_key() {
        let key_store = InMemoryKeyStore::new();
        key_store.store("bad", &[1, 2, 3]).expect("store");
        let err = KeystoreEncryptionService::new(&KeystoreCryptoConfig::new("bad"), &key_store)
            .expect_err("wrong length");
        assert!(matches!(err, ConfigError::Keystore(_)));
    }

    #[test]
    fn different_keystores_do_not_interoperate() {
        let config = KeystoreCryptoConfig::new("device-key");
        let a = KeystoreEncryptionService::new(&config, &InMemoryKeyStore::new()).expect("a");
        let b = KeystoreEncryptionService::new(&config, &InMemoryKeyStore::new()).expect("b");
        let cipher = a.encrypt(b"x").expect("encrypt");
        assert_eq!(b.decrypt(&cipher), Err(DecryptError::Mismatch));
    }

    #[test]
    fn random_helpers_have_expected_sizes() {
        assert_eq!(random_salt().len(), SALT_LEN);
        assert_eq!(random_bytes(5).len(), 5);
        assert_ne!(random_iv(), random_iv());
    }
}
