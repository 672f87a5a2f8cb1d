//! Concrete stores, encoders and encryption services for `vaultbox-core`.
//! Records are encrypted with AES-256-GCM before they reach SQLite; keys come
//! from a passphrase (Argon2id) or the OS keyring.

pub mod blob_store;
pub mod crypto;
pub mod encoding;
pub mod key_store;
pub mod registry;
pub mod settings;
pub mod sqlite;

pub use blob_store::BlobStore;
pub use crypto::{KeystoreEncryptionService, PassphraseEncryptionService};
pub use encoding::{encoder_for, EncryptedEncoder, PlistFormat, StructuredEncoder, TextEncoder};
pub use key_store::{InMemoryKeyStore, KeyStoreError, KeyringKeyStore, SecureKeyStore};
pub use registry::{KeyServiceRegistry, StoreRegistry};
pub use settings::Settings;
pub use sqlite::{BlobBackend, SqliteBackend};
