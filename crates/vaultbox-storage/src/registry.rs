//! Caller-owned registries enforcing one instance per name.
//!
//! [`KeyServiceRegistry`] caches encryption services so the expensive key
//! derivation runs once per name. [`StoreRegistry`] caches stores and resolves
//! their encryption services through a shared key-service registry.
//!
//! Each registry is guarded by a single mutex. Every mutation is one map
//! operation, so a poisoned lock still guards a consistent map and is
//! recovered rather than reported.

use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, info, instrument};
use vaultbox_core::{
    ConfigError, CryptoConfig, EncryptionService, EncryptionSource, MemoryStore, RegistryError,
    Store, StoreConfig, StoreKind,
};

use crate::{
    blob_store::{store_path, BlobStore},
    crypto::{KeystoreEncryptionService, PassphraseEncryptionService},
    encoding::encoder_for,
    key_store::{KeyringKeyStore, SecureKeyStore},
    settings::Settings,
    sqlite::SqliteBackend,
};

fn lock_map<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Named encryption services, built lazily from [`CryptoConfig`]s.
pub struct KeyServiceRegistry {
    key_store: Arc<dyn SecureKeyStore>,
    services: Mutex<HashMap<String, Arc<dyn EncryptionService>>>,
}

impl KeyServiceRegistry {
    pub fn new(key_store: Arc<dyn SecureKeyStore>) -> Self {
        Self {
            key_store,
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the service registered under the config's name, building it on
    /// first request. A name always maps to the same instance; a later config
    /// with the same name but different fields gets the existing service.
    ///
    /// Passphrase derivation runs without holding the registry lock. When two
    /// callers race on the same unregistered name both derive, the first
    /// insert wins, and the other instance is dropped.
    #[instrument(skip_all, fields(name = tracing::field::Empty))]
    pub fn get(&self, config: &CryptoConfig) -> Result<Arc<dyn EncryptionService>, RegistryError> {
        config.validate()?;
        let name = config.registry_key();
        tracing::Span::current().record("name", name.as_str());

        match config {
            // Key generation must not race: two generated keys would leave the
            // registry and the key store disagreeing. It is cheap, so build
            // under the lock.
            CryptoConfig::Keystore(cfg) => {
                let mut services = lock_map(&self.services);
                if let Some(existing) = services.get(&name) {
                    return Ok(Arc::clone(existing));
                }
                let service: Arc<dyn EncryptionService> =
                    Arc::new(KeystoreEncryptionService::new(cfg, self.key_store.as_ref())?);
                services.insert(name, Arc::clone(&service));
                info!("registered keystore encryption service");
                Ok(service)
            }
            CryptoConfig::Passphrase(cfg) => {
                if let Some(existing) = self.lookup(&name) {
                    return Ok(existing);
                }
                let built: Arc<dyn EncryptionService> =
                    Arc::new(PassphraseEncryptionService::new(cfg)?);

                match lock_map(&self.services).entry(name) {
                    Entry::Occupied(entry) => {
                        debug!("lost construction race; discarding derived key");
                        Ok(Arc::clone(entry.get()))
                    }
                    Entry::Vacant(entry) => {
                        info!("registered passphrase encryption service");
                        Ok(Arc::clone(entry.insert(built)))
                    }
                }
            }
        }
    }

    /// Registered service, without constructing anything.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn EncryptionService>> {
        lock_map(&self.services).get(name).cloned()
    }

    /// Unregisters a service. Stores already holding it keep working.
    #[instrument(skip(self))]
    pub fn remove(&self, name: &str) -> Option<Arc<dyn EncryptionService>> {
        let removed = lock_map(&self.services).remove(name);
        if removed.is_some() {
            debug!("removed encryption service");
        }
        removed
    }

    pub fn clear(&self) {
        lock_map(&self.services).clear();
    }

    pub fn len(&self) -> usize {
        lock_map(&self.services).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named stores, built lazily from [`StoreConfig`]s. Blob-backed stores live
/// in one file per name under `data_dir`.
pub struct StoreRegistry {
    data_dir: PathBuf,
    key_services: Arc<KeyServiceRegistry>,
    stores: Mutex<HashMap<String, Arc<dyn Store>>>,
}

impl StoreRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, key_services: Arc<KeyServiceRegistry>) -> Self {
        Self {
            data_dir: data_dir.into(),
            key_services,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Registry rooted at the configured data directory, with keystore
    /// services backed by the OS keyring.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let data_dir = settings.data_dir()?;
        let key_store = KeyringKeyStore::new(settings.keyring_service());
        debug!(data_dir = %data_dir.display(), "initializing store registry");
        Ok(Self::new(
            data_dir,
            Arc::new(KeyServiceRegistry::new(Arc::new(key_store))),
        ))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn key_services(&self) -> &Arc<KeyServiceRegistry> {
        &self.key_services
    }

    /// Returns the store registered under `config.name`, creating it on first
    /// request. Asking for an existing name with a different kind fails with
    /// [`ConfigError::KindMismatch`].
    #[instrument(skip_all, fields(store = %config.name, kind = ?config.kind))]
    pub fn get(&self, config: &StoreConfig) -> Result<Arc<dyn Store>, RegistryError> {
        config.validate()?;
        if let Some(existing) = existing_store(&lock_map(&self.stores), config)? {
            return Ok(existing);
        }

        // Resolve before taking the store lock; derivation may be slow.
        let service = self.resolve_encryption(config)?;

        let mut stores = lock_map(&self.stores);
        if let Some(existing) = existing_store(&stores, config)? {
            return Ok(existing);
        }
        let store = self.build(config, service)?;
        stores.insert(config.name.clone(), Arc::clone(&store));
        info!("registered store");
        Ok(store)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Store>> {
        lock_map(&self.stores).get(name).cloned()
    }

    /// Unregisters a store. Durable contents stay on disk and are visible
    /// again after the next `get` with the same name.
    #[instrument(skip(self))]
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Store>> {
        let removed = lock_map(&self.stores).remove(name);
        if removed.is_some() {
            debug!("removed store");
        }
        removed
    }

    pub fn clear(&self) {
        lock_map(&self.stores).clear();
    }

    fn resolve_encryption(
        &self,
        config: &StoreConfig,
    ) -> Result<Option<Arc<dyn EncryptionService>>, RegistryError> {
        if config.kind != StoreKind::EncryptedBlob {
            return Ok(None);
        }
        match &config.encryption {
            Some(EncryptionSource::Service(service)) => Ok(Some(Arc::clone(service))),
            Some(EncryptionSource::Crypto(crypto)) => Ok(Some(self.key_services.get(crypto)?)),
            None => Err(ConfigError::MissingEncryptionService {
                store: config.name.clone(),
            }
            .into()),
        }
    }

    fn build(
        &self,
        config: &StoreConfig,
        service: Option<Arc<dyn EncryptionService>>,
    ) -> Result<Arc<dyn Store>, RegistryError> {
        let store: Arc<dyn Store> = match config.kind {
            StoreKind::Memory => Arc::new(MemoryStore::with_identifier_field(
                &config.name,
                &config.identifier_field,
            )),
            StoreKind::Blob => Arc::new(
                BlobStore::new(&config.name, self.open_backend(config)?, encoder_for(config.format))
                    .with_identifier_field(&config.identifier_field),
            ),
            StoreKind::EncryptedBlob => {
                let service = service.ok_or_else(|| ConfigError::MissingEncryptionService {
                    store: config.name.clone(),
                })?;
                Arc::new(
                    BlobStore::encrypted(
                        &config.name,
                        self.open_backend(config)?,
                        encoder_for(config.format),
                        service,
                    )
                    .with_identifier_field(&config.identifier_field),
                )
            }
        };
        Ok(store)
    }

    fn open_backend(&self, config: &StoreConfig) -> Result<Box<SqliteBackend>, RegistryError> {
        Ok(Box::new(SqliteBackend::open(&store_path(
            &self.data_dir,
            &config.name,
        ))?))
    }
}

fn existing_store(
    stores: &HashMap<String, Arc<dyn Store>>,
    config: &StoreConfig,
) -> Result<Option<Arc<dyn Store>>, RegistryError> {
    match stores.get(&config.name) {
        Some(store) if store.kind() == config.kind => Ok(Some(Arc::clone(store))),
        Some(store) => Err(ConfigError::KindMismatch {
            name: config.name.clone(),
            existing: store.kind(),
            requested: config.kind,
        }
        .into()),
        None => Ok(None),
    }
}
