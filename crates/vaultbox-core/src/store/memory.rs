use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, instrument};

use super::{prepare_record, Store, StoreKind};
use crate::{
    error::{StorageError, StoreError},
    record::{Record, DEFAULT_IDENTIFIER_FIELD},
};

/// In-process store; not durable across restarts. One lock guards all
/// operations on an instance.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    identifier_field: String,
    inner: Arc<Mutex<HashMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_identifier_field(name, DEFAULT_IDENTIFIER_FIELD)
    }

    pub fn with_identifier_field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier_field: field.into(),
            inner: Arc::default(),
        }
    }

    /// Copy of the current contents keyed by id.
    pub fn dump(&self) -> Result<HashMap<String, Record>, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Record>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Storage(StorageError::Poisoned))
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn identifier_field(&self) -> &str {
        &self.identifier_field
    }

    #[instrument(skip_all, fields(store = %self.name))]
    fn save(&self, mut record: Record) -> Result<Record, StoreError> {
        let id = prepare_record(&mut record, &self.identifier_field)?;
        let mut map = self.lock()?;
        map.insert(id.clone(), record.clone());
        debug!(%id, "saved record");
        Ok(record)
    }

    #[instrument(skip_all, fields(store = %self.name, count = records.len()))]
    fn save_all(&self, records: Vec<Record>) -> Result<Vec<Record>, StoreError> {
        let mut prepared = Vec::with_capacity(records.len());
        for mut record in records {
            let id = prepare_record(&mut record, &self.identifier_field)?;
            prepared.push((id, record));
        }

        let mut map = self.lock()?;
        Ok(prepared
            .into_iter()
            .map(|(id, record)| {
                map.insert(id, record.clone());
                record
            })
            .collect())
    }

    fn read(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn read_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    #[instrument(skip_all, fields(store = %self.name, %id))]
    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(id).is_some())
    }

    #[instrument(skip_all, fields(store = %self.name))]
    fn reset(&self) -> Result<(), StoreError> {
        self.lock()?.clear();
        debug!("store reset");
        Ok(())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::record::Value;

    #[test]
    fn save_assigns_id_and_reads_back() {
        let store = MemoryStore::new("people");
        let saved = store
            .save(Record::new().with("name", "Alice"))
            .expect("save should succeed");

        let id = saved.get("id").and_then(Value::as_str).expect("id").to_string();
        let read = store.read(&id).expect("read").expect("record present");
        assert_eq!(read, Record::new().with("id", id.as_str()).with("name", "Alice"));
    }

    #[test]
    fn saving_same_id_updates_in_place() {
        let store = MemoryStore::new("people");
        store
            .save(Record::new().with("id", "custom1").with("name", "Alice"))
            .expect("first save");
        store
            .save(Record::new().with("id", "custom1").with("name", "Alicia"))
            .expect("second save");

        let all = store.read_all().expect("read_all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("name"), Some(&Value::from("Alicia")));
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let store = MemoryStore::new("people");
        store.save(Record::new().with("id", "a")).expect("save");

        assert!(store.remove("a").expect("remove"));
        assert!(!store.remove("a").expect("remove again"));
        assert_eq!(store.read("a").expect("read"), None);
    }

    #[test]
    fn reset_clears_everything() {
        let store = MemoryStore::new("people");
        let saved = store.save(Record::new().with("name", "x")).expect("save");
        let id = saved.get("id").and_then(Value::as_str).expect("id").to_string();

        store.reset().expect("reset");
        assert!(store.read_all().expect("read_all").is_empty());
        assert_eq!(store.read(&id).expect("read"), None);
        assert!(store.is_empty().expect("is_empty"));
    }

    #[test]
    fn save_all_is_all_or_nothing() {
        let store = MemoryStore::new("people");
        let err = store
            .save_all(vec![
                Record::new().with("id", "ok"),
                Record::new().with("id", 7),
            ])
            .expect_err("second record has a bad id");
        assert!(matches!(err, StoreError::InvalidIdentifier { .. }));
        assert!(store.is_empty().expect("is_empty"));

        let saved = store
            .save_all(vec![Record::new().with("n", 1), Record::new().with("n", 2)])
            .expect("batch save");
        assert_eq!(saved.len(), 2);
        assert_eq!(store.dump().expect("dump").len(), 2);
    }

    #[test]
    fn filter_selects_matching_records() {
        let store = MemoryStore::new("people");
        store
            .save_all(vec![
                Record::new().with("id", "1").with("role", "admin"),
                Record::new().with("id", "2").with("role", "user"),
            ])
            .expect("save");

        let admins = store
            .filter(&|r: &Record| r.get("role") == Some(&Value::from("admin")))
            .expect("filter");
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].get("id"), Some(&Value::from("1")));
    }

    #[test]
    fn concurrent_saves_are_not_lost() {
        let store = MemoryStore::new("shared");
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .save(Record::new().with("id", format!("{t}-{i}")))
                            .expect("save");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(store.read_all().expect("read_all").len(), 400);
    }
}
