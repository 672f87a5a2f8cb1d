use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("lock poisoned")]
    Poisoned,
}

/// Platform secure storage for raw key bytes, addressed by alias
/// (OS keychain in production; memory in tests).
pub trait SecureKeyStore: Send + Sync {
    fn store(&self, alias: &str, bytes: &[u8]) -> Result<(), KeyStoreError>;

    fn retrieve(&self, alias: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;
}

/// OS keyring-backed key store. Each alias is one keyring entry under the
/// configured service name; bytes are stored base64-encoded. Entry handles
/// are opened once per alias and reused for the lifetime of the store.
#[derive(Debug, Clone)]
pub struct KeyringKeyStore {
    service: String,
    entries: Arc<Mutex<HashMap<String, Arc<keyring::Entry>>>>,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Arc::default(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, alias: &str) -> Result<Arc<keyring::Entry>, KeyStoreError> {
        let mut entries = self.entries.lock().map_err(|_| KeyStoreError::Poisoned)?;
        if let Some(entry) = entries.get(alias) {
            return Ok(Arc::clone(entry));
        }
        let entry = Arc::new(
            keyring::Entry::new(&self.service, alias)
                .map_err(|e| KeyStoreError::Keyring(e.to_string()))?,
        );
        entries.insert(alias.to_string(), Arc::clone(&entry));
        Ok(entry)
    }
}

impl SecureKeyStore for KeyringKeyStore {
    fn store(&self, alias: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        self.entry(alias)?
            .set_password(&general_purpose::STANDARD.encode(bytes))
            .map_err(|e| KeyStoreError::Keyring(e.to_string()))?;
        debug!(service = %self.service, alias, "stored key in keyring");
        Ok(())
    }

    fn retrieve(&self, alias: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        match self.entry(alias)?.get_password() {
            Ok(secret) => general_purpose::STANDARD
                .decode(secret)
                .map(Some)
                .map_err(|e| KeyStoreError::Decode(e.to_string())),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyStoreError::Keyring(err.to_string())),
        }
    }
}

/// In-memory key store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureKeyStore for InMemoryKeyStore {
    fn store(&self, alias: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        self.inner
            .lock()
            .map_err(|_| KeyStoreError::Poisoned)?
            .insert(alias.to_string(), bytes.to_vec());
        Ok(())
    }

    fn retrieve(&self, alias: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| KeyStoreError::Poisoned)?
            .get(alias)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_by_alias() {
        let store = InMemoryKeyStore::new();
        assert_eq!(store.retrieve("device").expect("retrieve"), None);

        store.store("device", &[7u8; 32]).expect("store");
        assert_eq!(
            store.retrieve("device").expect("retrieve"),
            Some(vec![7u8; 32])
        );
        assert_eq!(store.retrieve("other").expect("retrieve"), None);
    }

    #[test]
    fn clones_share_contents() {
        let store = InMemoryKeyStore::new();
        let clone = store.clone();
        store.store("a", b"k").expect("store");
        assert_eq!(clone.retrieve("a").expect("retrieve"), Some(b"k".to_vec()));
    }

    // Tests never touch the real OS keyring.
    fn mock_keyring(service: &str) -> KeyringKeyStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringKeyStore::new(service)
    }

    #[test]
    fn keyring_store_round_trips_by_alias() {
        let store = mock_keyring("vaultbox-test");
        assert_eq!(store.retrieve("device").expect("retrieve"), None);

        store.store("device", &[7u8; 32]).expect("store");
        assert_eq!(
            store.retrieve("device").expect("retrieve"),
            Some(vec![7u8; 32])
        );
        assert_eq!(store.retrieve("other").expect("retrieve"), None);
    }

    #[test]
    fn keyring_store_overwrites_and_shares_entries_across_clones() {
        let store = mock_keyring("vaultbox-test");
        let clone = store.clone();
        store.store("device", b"first").expect("store");
        clone.store("device", b"second").expect("overwrite");

        assert_eq!(
            store.retrieve("device").expect("retrieve"),
            Some(b"second".to_vec())
        );
        assert_eq!(clone.service(), "vaultbox-test");
    }

    #[test]
    fn keystore_service_key_survives_through_keyring() {
        use vaultbox_core::{EncryptionService, KeystoreCryptoConfig};

        use crate::crypto::KeystoreEncryptionService;

        let store = mock_keyring("vaultbox-test");
        let config = KeystoreCryptoConfig::new("device-key");
        let first = KeystoreEncryptionService::new(&config, &store).expect("create");
        let second = KeystoreEncryptionService::new(&config, &store).expect("reload");

        let cipher = first.encrypt(b"bound to device").expect("encrypt");
        assert_eq!(second.decrypt(&cipher).expect("decrypt"), b"bound to device");
    }
}
