use std::fmt::Debug;

use crate::{error::StoreError, record::Record};

mod memory;

pub use memory::MemoryStore;

/// Backend variant of a store. Together with the name it identifies a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// In-process only; contents vanish with the instance.
    #[default]
    Memory,
    /// Serialized records in a durable blob table.
    Blob,
    /// Like `Blob`, with the encoder output encrypted.
    EncryptedBlob,
}

/// CRUD contract shared by every store variant. Calls are synchronous and
/// serialized per instance; blob-backed stores block on disk I/O.
pub trait Store: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> StoreKind;

    /// Field holding each record's identifier.
    fn identifier_field(&self) -> &str;

    /// Persists a record, assigning an id when it has none, and returns the
    /// stored record including its id. Saving an existing id replaces it.
    fn save(&self, record: Record) -> Result<Record, StoreError>;

    /// Saves a batch; either every record is persisted or none is.
    fn save_all(&self, records: Vec<Record>) -> Result<Vec<Record>, StoreError>;

    fn read(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Snapshot of the current contents.
    fn read_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Returns true when something was removed.
    fn remove(&self, id: &str) -> Result<bool, StoreError>;

    fn reset(&self) -> Result<(), StoreError>;

    fn filter(&self, predicate: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|record| predicate(record))
            .collect())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read_all()?.is_empty())
    }
}

/// Assigns or validates the id of `record` under `field`.
pub fn prepare_record(record: &mut Record, field: &str) -> Result<String, StoreError> {
    crate::record::get_or_assign_id(record, field).map_err(|problem| {
        let reason = match problem {
            crate::record::IdentifierProblem::Empty => "identifier is empty".to_string(),
            crate::record::IdentifierProblem::NotAString { kind } => {
                format!("expected a string, found {kind}")
            }
        };
        StoreError::InvalidIdentifier {
            field: field.to_string(),
            reason,
        }
    })
}
