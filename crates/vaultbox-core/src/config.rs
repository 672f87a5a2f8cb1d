//! Immutable configuration values for encryption services and stores.
//!
//! Both are plain data validated up front; registries refuse to build
//! anything from a configuration that fails `validate()`.

use std::{
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::{Arc, OnceLock},
};

use zeroize::Zeroizing;

use crate::{
    crypto::EncryptionService,
    encoder::EncoderFormat,
    error::ConfigError,
    record::DEFAULT_IDENTIFIER_FIELD,
    store::StoreKind,
};

pub const DEFAULT_KDF_ITERATIONS: u32 = 2;
pub const DEFAULT_KDF_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_KDF_PARALLELISM: u32 = 1;
pub const MIN_SALT_LEN: usize = 8;

/// How to build one encryption service.
#[derive(Debug, Clone)]
pub enum CryptoConfig {
    Passphrase(PassphraseCryptoConfig),
    Keystore(KeystoreCryptoConfig),
}

impl CryptoConfig {
    /// Registry slot for the service built from this config: the explicit
    /// name when one is set, otherwise an identity derived from the fields.
    pub fn registry_key(&self) -> String {
        match self {
            CryptoConfig::Passphrase(cfg) => cfg.registry_key(),
            CryptoConfig::Keystore(cfg) => cfg.registry_key(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CryptoConfig::Passphrase(cfg) => cfg.validate(),
            CryptoConfig::Keystore(cfg) => cfg.validate(),
        }
    }
}

impl From<PassphraseCryptoConfig> for CryptoConfig {
    fn from(cfg: PassphraseCryptoConfig) -> Self {
        CryptoConfig::Passphrase(cfg)
    }
}

impl From<KeystoreCryptoConfig> for CryptoConfig {
    fn from(cfg: KeystoreCryptoConfig) -> Self {
        CryptoConfig::Keystore(cfg)
    }
}

/// Key derived from a passphrase; the same fields always produce the same key.
#[derive(Clone)]
pub struct PassphraseCryptoConfig {
    pub name: Option<String>,
    passphrase: Zeroizing<String>,
    pub salt: Vec<u8>,
    /// Argon2 time cost.
    pub iterations: u32,
    pub memory_kib: u32,
    pub parallelism: u32,
}

impl PassphraseCryptoConfig {
    pub fn new(passphrase: impl Into<String>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            name: None,
            passphrase: Zeroizing::new(passphrase.into()),
            salt: salt.into(),
            iterations: DEFAULT_KDF_ITERATIONS,
            memory_kib: DEFAULT_KDF_MEMORY_KIB,
            parallelism: DEFAULT_KDF_PARALLELISM,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn registry_key(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("passphrase#{:016x}", self.fingerprint()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(self.name.as_deref())?;
        if self.passphrase.is_empty() {
            return Err(ConfigError::MissingField("passphrase"));
        }
        if self.salt.len() < MIN_SALT_LEN {
            return Err(ConfigError::InvalidField {
                field: "salt",
                reason: format!(
                    "must be at least {MIN_SALT_LEN} bytes, got {}",
                    self.salt.len()
                ),
            });
        }
        if self.iterations == 0 {
            return Err(ConfigError::InvalidField {
                field: "iterations",
                reason: "must be at least 1".into(),
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidField {
                field: "parallelism",
                reason: "must be at least 1".into(),
            });
        }
        if u64::from(self.memory_kib) < 8 * u64::from(self.parallelism) {
            return Err(ConfigError::InvalidField {
                field: "memory_kib",
                reason: format!("must be at least {} KiB", 8 * u64::from(self.parallelism)),
            });
        }
        Ok(())
    }

    /// Keyed with a per-process random secret: equal configs agree within
    /// a process, and a logged fingerprint cannot be checked against
    /// passphrase guesses offline.
    fn fingerprint(&self) -> u64 {
        static FINGERPRINT_KEY: OnceLock<RandomState> = OnceLock::new();
        let mut hasher = FINGERPRINT_KEY.get_or_init(RandomState::new).build_hasher();
        self.passphrase.as_bytes().hash(&mut hasher);
        self.salt.hash(&mut hasher);
        self.iterations.hash(&mut hasher);
        self.memory_kib.hash(&mut hasher);
        self.parallelism.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for PassphraseCryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseCryptoConfig")
            .field("name", &self.name)
            .field("passphrase", &"<redacted>")
            .field("salt_len", &self.salt.len())
            .field("iterations", &self.iterations)
            .field("memory_kib", &self.memory_kib)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

/// Key kept in the platform secure key store under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreCryptoConfig {
    pub name: Option<String>,
    pub alias: String,
}

impl KeystoreCryptoConfig {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            name: None,
            alias: alias.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn registry_key(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("keystore:{}", self.alias))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(self.name.as_deref())?;
        if self.alias.is_empty() {
            return Err(ConfigError::MissingField("alias"));
        }
        Ok(())
    }
}

fn validate_name(name: Option<&str>) -> Result<(), ConfigError> {
    match name {
        Some("") => Err(ConfigError::InvalidField {
            field: "name",
            reason: "must not be empty".into(),
        }),
        _ => Ok(()),
    }
}

/// Where an encrypted store gets its encryption service from.
#[derive(Debug, Clone)]
pub enum EncryptionSource {
    /// An already built service, shared as-is.
    Service(Arc<dyn EncryptionService>),
    /// Resolved through the key-service registry.
    Crypto(CryptoConfig),
}

/// Description of one named store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub kind: StoreKind,
    pub encryption: Option<EncryptionSource>,
    pub identifier_field: String,
    /// Serialization layout for blob-backed kinds; ignored by memory stores.
    pub format: EncoderFormat,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StoreKind::default(),
            encryption: None,
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            format: EncoderFormat::default(),
        }
    }

    pub fn with_kind(mut self, kind: StoreKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_encryption_service(mut self, service: Arc<dyn EncryptionService>) -> Self {
        self.encryption = Some(EncryptionSource::Service(service));
        self
    }

    pub fn with_crypto_config(mut self, config: impl Into<CryptoConfig>) -> Self {
        self.encryption = Some(EncryptionSource::Crypto(config.into()));
        self
    }

    pub fn with_identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    pub fn with_format(mut self, format: EncoderFormat) -> Self {
        self.format = format;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        // The name doubles as a file name for blob stores.
        if self.name == "."
            || self.name == ".."
            || self.name.contains(['/', '\\', '\0'])
        {
            return Err(ConfigError::InvalidField {
                field: "name",
                reason: format!("`{}` is not usable as a file name", self.name),
            });
        }
        if self.identifier_field.is_empty() {
            return Err(ConfigError::MissingField("identifier_field"));
        }
        match (&self.kind, &self.encryption) {
            (StoreKind::EncryptedBlob, None) => Err(ConfigError::MissingEncryptionService {
                store: self.name.clone(),
            }),
            (StoreKind::EncryptedBlob, Some(EncryptionSource::Crypto(crypto))) => crypto.validate(),
            (StoreKind::EncryptedBlob, Some(EncryptionSource::Service(_))) => Ok(()),
            (_, Some(_)) => Err(ConfigError::InvalidField {
                field: "encryption",
                reason: format!("{:?} stores do not encrypt", self.kind),
            }),
            (_, None) => Ok(()),
        }
    }
}
