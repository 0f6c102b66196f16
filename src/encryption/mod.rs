//! Encryption Module Implementation
//!
//! AES-256-GCM envelope for document payloads at the pipeline boundary.
//! Wire format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use std::fmt;
use std::sync::Arc;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::instrument;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub mod key_management;

pub use self::key_management::{KeyProvider, StaticKeyProvider, SymmetricKey, KEY_LEN};

/// Nonce prefix length
pub const NONCE_LEN: usize = 12;
/// Authentication tag length
pub const TAG_LEN: usize = 16;

/// Seals and opens payloads with the provider's current key
pub struct EnvelopeCipher {
    keys: Arc<dyn KeyProvider>,
    rng: SystemRandom,
}

impl EnvelopeCipher {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self {
            keys,
            rng: SystemRandom::new(),
        }
    }

    /// Identifier of the key currently used for sealing
    pub fn key_id(&self) -> Result<String> {
        Ok(self.keys.current_key()?.id().to_string())
    }

    /// Creates encryption key from the provider
    fn create_key(&self) -> Result<LessSafeKey> {
        let key = self.keys.current_key()?;
        let unbound_key = UnboundKey::new(&AES_256_GCM, key.expose())
            .map_err(|_| Error::EncryptionFailure("Invalid key".into()))?;
        Ok(LessSafeKey::new(unbound_key))
    }

    #[instrument(skip(self, plaintext), fields(len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.create_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| Error::EncryptionFailure("Failed to generate nonce".into()))?;

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| Error::EncryptionFailure("Failed to encrypt data".into()))?;

        let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&in_out);
        Ok(output)
    }

    /// Fails closed: undersized input or a tag mismatch never yields bytes.
    #[instrument(skip(self, sealed), fields(len = sealed.len()))]
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::DecryptionFailure(format!(
                "ciphertext of {} bytes is shorter than nonce and tag",
                sealed.len()
            )));
        }
        let key = self
            .create_key()
            .map_err(|e| Error::DecryptionFailure(e.to_string()))?;

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| Error::DecryptionFailure("Invalid nonce".into()))?;

        let mut in_out = Zeroizing::new(ciphertext.to_vec());
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), in_out.as_mut_slice())
            .map_err(|_| Error::DecryptionFailure("authentication tag mismatch".into()))?;
        Ok(plaintext.to_vec())
    }
}

impl fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeCipher").field("keys", &self.keys).finish()
    }
}
