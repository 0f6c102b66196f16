//! Key Management Implementation
//!
//! The payload key is injected into the pipeline through a `KeyProvider` instead of
//! living in process-global state. Where the key comes from is a configuration
//! concern (`KeySource`); the id travels with the key so rotation can be layered on
//! top without touching the cipher.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, instrument};
use zeroize::Zeroizing;

use crate::config::KeySource;
use crate::error::{Error, Result};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// Symmetric payload key
pub struct SymmetricKey {
    id: String,
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl SymmetricKey {
    /// Generates a random key that lives only as long as the process.
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(&mut bytes[..])
            .map_err(|_| Error::EncryptionFailure("Key generation failed".into()))?;

        let mut tag = [0u8; 4];
        rng.fill(&mut tag)
            .map_err(|_| Error::EncryptionFailure("Key generation failed".into()))?;

        Ok(Self {
            id: format!("ephemeral-{}", hex::encode(tag)),
            bytes,
        })
    }

    pub fn from_bytes(id: impl Into<String>, raw: &[u8]) -> Result<Self> {
        if raw.len() != KEY_LEN {
            return Err(Error::ConfigError(format!(
                "Key must be {} bytes, got {}",
                KEY_LEN,
                raw.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(raw);
        Ok(Self {
            id: id.into(),
            bytes,
        })
    }

    /// Accepts 64 hex characters or standard base64 of 32 bytes.
    pub fn parse(id: impl Into<String>, encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let raw = if encoded.len() == KEY_LEN * 2 && encoded.chars().all(|c| c.is_ascii_hexdigit()) {
            hex::decode(encoded).map_err(|e| Error::ConfigError(format!("Invalid hex key: {}", e)))?
        } else {
            BASE64
                .decode(encoded)
                .map_err(|e| Error::ConfigError(format!("Invalid base64 key: {}", e)))?
        };
        let raw = Zeroizing::new(raw);
        Self::from_bytes(id, &raw)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.bytes.as_ref()
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Supplies the key the cipher should use right now
pub trait KeyProvider: Send + Sync + fmt::Debug {
    fn current_key(&self) -> Result<Arc<SymmetricKey>>;
}

/// Holds a single key for the lifetime of the provider
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: Arc<SymmetricKey>,
}

impl StaticKeyProvider {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Resolves the configured key source.
    #[instrument]
    pub fn from_source(source: &KeySource) -> Result<Self> {
        let key = match source {
            KeySource::Ephemeral => SymmetricKey::generate()?,
            KeySource::Env { var } => {
                let value = Zeroizing::new(std::env::var(var).map_err(|_| {
                    Error::ConfigError(format!("Key environment variable {} is not set", var))
                })?);
                SymmetricKey::parse(format!("env:{}", var), &value)?
            }
            KeySource::File { path } => {
                let value = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
                    Error::ConfigError(format!("Cannot read key file {}: {}", path.display(), e))
                })?);
                SymmetricKey::parse(format!("file:{}", path.display()), &value)?
            }
        };
        info!("Payload key {} loaded", key.id());
        Ok(Self::new(key))
    }
}

impl KeyProvider for StaticKeyProvider {
    fn current_key(&self) -> Result<Arc<SymmetricKey>> {
        Ok(Arc::clone(&self.key))
    }
}
