//! SQLite blob backend.
//!
//! One database file per store holding a single schemaless table. The blob
//! column contains exactly the encoder output; this backend never looks inside.

use std::{fs, path::Path, time::Duration};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use vaultbox_core::StorageError;

/// Raw byte storage keyed by record id. Implementations know nothing about
/// encoding or encryption.
pub trait BlobBackend: Send {
    fn put(&mut self, id: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// Writes every entry or none.
    fn put_many(&mut self, entries: &[(String, Vec<u8>)]) -> Result<(), StorageError>;

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Every blob in insertion order.
    fn all(&self) -> Result<Vec<Vec<u8>>, StorageError>;

    fn count(&self) -> Result<usize, StorageError>;

    fn delete(&mut self, id: &str) -> Result<bool, StorageError>;

    fn clear(&mut self) -> Result<(), StorageError>;
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(backend_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend_err)?;

        let backend = Self { conn };
        backend.run_migrations()?;
        debug!(path = %path.display(), "opened sqlite backend");
        Ok(backend)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let backend = Self {
            conn: Connection::open_in_memory().map_err(backend_err)?,
        };
        backend.run_migrations()?;
        Ok(backend)
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                    id    TEXT PRIMARY KEY,
                    value BLOB NOT NULL
                );",
            )
            .map_err(backend_err)
    }
}

const UPSERT: &str = "INSERT INTO records (id, value) VALUES (?1, ?2)
     ON CONFLICT(id) DO UPDATE SET value = excluded.value";

impl BlobBackend for SqliteBackend {
    fn put(&mut self, id: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.conn
            .execute(UPSERT, params![id, blob])
            .map_err(backend_err)?;
        Ok(())
    }

    fn put_many(&mut self, entries: &[(String, Vec<u8>)]) -> Result<(), StorageError> {
        let tx = self.conn.transaction().map_err(backend_err)?;
        {
            let mut stmt = tx.prepare_cached(UPSERT).map_err(backend_err)?;
            for (id, blob) in entries {
                stmt.execute(params![id, blob]).map_err(backend_err)?;
            }
        }
        tx.commit().map_err(backend_err)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.conn
            .query_row(
                "SELECT value FROM records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend_err)
    }

    fn all(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM records ORDER BY rowid")
            .map_err(backend_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .map_err(backend_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend_err)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM records", [], |row| row.get(0))
            .map_err(backend_err)?;
        Ok(count as usize)
    }

    fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        let removed = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1", params![id])
            .map_err(backend_err)?;
        Ok(removed > 0)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM records", [])
            .map_err(backend_err)?;
        Ok(())
    }
}

fn backend_err(err: rusqlite::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}
