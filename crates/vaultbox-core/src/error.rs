use thiserror::Error;

use crate::store::StoreKind;

/// Failure turning a value into bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A value inside the tree cannot be represented by this encoder.
    #[error("unsupported value at {path}: {reason}")]
    UnsupportedValue { path: String, reason: String },
    /// The encoder does not accept this kind of value at the root.
    #[error("unsupported root value of kind {kind}")]
    UnsupportedRoot { kind: &'static str },
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptError),
}

/// Failure turning bytes back into a value. Wrong keys and corrupted input
/// both land here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodingError {
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("unexpected root value of kind {kind}")]
    UnexpectedRoot { kind: &'static str },
    #[error("unsupported value at {path}: {reason}")]
    UnsupportedValue { path: String, reason: String },
    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptError {
    #[error("initialization vector must be {expected} bytes, got {actual}")]
    InvalidIv { expected: usize, actual: usize },
    #[error("cipher rejected the input")]
    Cipher,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("initialization vector must be {expected} bytes, got {actual}")]
    InvalidIv { expected: usize, actual: usize },
    #[error("ciphertext too short ({len} bytes)")]
    Truncated { len: usize },
    /// Key or ciphertext do not match; indistinguishable from tampering.
    #[error("ciphertext does not match key")]
    Mismatch,
}

/// Backend I/O failure, kept apart from encoding concerns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("io failure: {0}")]
    Io(String),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("store `{store}` is encrypted but no encryption service was supplied")]
    MissingEncryptionService { store: String },
    #[error("store `{name}` already registered as {existing:?}, requested {requested:?}")]
    KindMismatch {
        name: String,
        existing: StoreKind,
        requested: StoreKind,
    },
    #[error("keystore failure: {0}")]
    Keystore(String),
    #[error("no data directory available")]
    NoDataDir,
    #[error("settings error: {0}")]
    Settings(String),
}

/// Errors surfaced by store CRUD operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid identifier in field `{field}`: {reason}")]
    InvalidIdentifier { field: String, reason: String },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors surfaced by the key-service and store registries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
