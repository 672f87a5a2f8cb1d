use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, instrument};
use vaultbox_core::{
    record::DEFAULT_IDENTIFIER_FIELD, store::prepare_record, DecodingError, Encoder,
    EncryptionService, Record, StorageError, Store, StoreError, StoreKind, Value,
};

use crate::{encoding::EncryptedEncoder, sqlite::BlobBackend};

/// File extension of per-store database files.
pub const STORE_FILE_EXTENSION: &str = "sqlite3";

/// Location of the backing file for a store `name` under `data_dir`.
pub fn store_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{name}.{STORE_FILE_EXTENSION}"))
}

/// Store over a [`BlobBackend`]: records are encoded before every write and
/// decoded after every read. Swapping in an [`EncryptedEncoder`] yields the
/// encrypted variant without touching the backend.
pub struct BlobStore {
    name: String,
    kind: StoreKind,
    identifier_field: String,
    encoder: Arc<dyn Encoder>,
    backend: Mutex<Box<dyn BlobBackend>>,
}

impl BlobStore {
    pub fn new(
        name: impl Into<String>,
        backend: Box<dyn BlobBackend>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: StoreKind::Blob,
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            encoder,
            backend: Mutex::new(backend),
        }
    }

    /// Same backend shape as [`BlobStore::new`], with `inner` output encrypted
    /// by `service`.
    pub fn encrypted(
        name: impl Into<String>,
        backend: Box<dyn BlobBackend>,
        inner: Arc<dyn Encoder>,
        service: Arc<dyn EncryptionService>,
    ) -> Self {
        let mut store = Self::new(name, backend, Arc::new(EncryptedEncoder::new(inner, service)));
        store.kind = StoreKind::EncryptedBlob;
        store
    }

    pub fn with_identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn BlobBackend>>, StoreError> {
        self.backend
            .lock()
            .map_err(|_| StoreError::Storage(StorageError::Poisoned))
    }

    fn encode(&self, record: &Record) -> Result<Vec<u8>, StoreError> {
        Ok(self.encoder.encode(&Value::Record(record.clone()))?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Record, StoreError> {
        match self.encoder.decode(bytes)? {
            Value::Record(record) => Ok(record),
            other => Err(DecodingError::UnexpectedRoot { kind: other.kind() }.into()),
        }
    }
}

impl fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStore")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("identifier_field", &self.identifier_field)
            .field("format", &self.encoder.format())
            .finish_non_exhaustive()
    }
}

impl Store for BlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn identifier_field(&self) -> &str {
        &self.identifier_field
    }

    #[instrument(skip_all, fields(store = %self.name, kind = ?self.kind))]
    fn save(&self, mut record: Record) -> Result<Record, StoreError> {
        let id = prepare_record(&mut record, &self.identifier_field)?;
        let blob = self.encode(&record)?;
        self.lock()?.put(&id, &blob)?;
        debug!(%id, bytes = blob.len(), "saved record");
        Ok(record)
    }

    #[instrument(skip_all, fields(store = %self.name, kind = ?self.kind, count = records.len()))]
    fn save_all(&self, records: Vec<Record>) -> Result<Vec<Record>, StoreError> {
        let mut saved = Vec::with_capacity(records.len());
        let mut entries = Vec::with_capacity(records.len());
        for mut record in records {
            let id = prepare_record(&mut record, &self.identifier_field)?;
            entries.push((id, self.encode(&record)?));
            saved.push(record);
        }
        self.lock()?.put_many(&entries)?;
        debug!("saved batch");
        Ok(saved)
    }

    #[instrument(skip_all, fields(store = %self.name, %id))]
    fn read(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let blob = self.lock()?.get(id)?;
        blob.map(|bytes| self.decode(&bytes)).transpose()
    }

    #[instrument(skip_all, fields(store = %self.name))]
    fn read_all(&self) -> Result<Vec<Record>, StoreError> {
        let blobs = self.lock()?.all()?;
        blobs.iter().map(|bytes| self.decode(bytes)).collect()
    }

    #[instrument(skip_all, fields(store = %self.name, %id))]
    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.delete(id)?)
    }

    #[instrument(skip_all, fields(store = %self.name))]
    fn reset(&self) -> Result<(), StoreError> {
        self.lock()?.clear()?;
        debug!("store reset");
        Ok(())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.count()? == 0)
    }
}
