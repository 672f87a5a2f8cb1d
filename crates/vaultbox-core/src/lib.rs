//! Core contracts for Vaultbox: records, encoders, encryption services and stores.
//! Concrete backends and ciphers live in `vaultbox-storage`; this crate keeps the
//! dependency surface minimal.

pub mod config;
pub mod crypto;
pub mod encoder;
pub mod error;
pub mod record;
pub mod store;

pub use config::{
    CryptoConfig, EncryptionSource, KeystoreCryptoConfig, PassphraseCryptoConfig, StoreConfig,
};
pub use crypto::EncryptionService;
pub use encoder::{Encoder, EncoderFormat};
pub use error::{
    ConfigError, DecodingError, DecryptError, EncodingError, EncryptError, RegistryError,
    StorageError, StoreError,
};
pub use record::{Record, Value, DEFAULT_IDENTIFIER_FIELD};
pub use store::{MemoryStore, Store, StoreKind};
