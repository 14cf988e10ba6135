//! Session Key Vault
//!
//! Owns the single 256-bit key that protects session state.
//!
//! # Blob format
//!
//! ```text
//! ┌──────────┬─────────────┬──────────────┬─────────────────────────────┐
//! │ magic 8B │ version u32 │ nonce 24B    │ XChaCha20-Poly1305 ct + tag │
//! │ SHSESS01 │ LE          │ (random)     │ (header bound as AAD)       │
//! └──────────┴─────────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! The key is generated lazily on first use, never rotated, and removed
//! only by [`KeyVault::destroy_key`]. Once destroyed, every blob sealed under
//! it is unrecoverable.

use crate::keystore::{AccessPolicy, SecureKeyStore};
use crate::VAULT_KEY_ID;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Key length in bytes
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 24;

/// Magic bytes identifying a sealed session blob
const BLOB_MAGIC: &[u8; 8] = b"SHSESS01";

/// Version of the blob format
const BLOB_VERSION: u32 = 1;

const HEADER_LEN: usize = BLOB_MAGIC.len() + 4;

/// Errors from sealing or opening a blob
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("blob truncated ({0} bytes)")]
    Truncated(usize),

    #[error("not a session blob")]
    BadMagic,

    #[error("unsupported blob version {0}")]
    UnsupportedVersion(u32),

    #[error("encryption failed")]
    Encrypt,

    #[error("integrity check failed (wrong key or tampered data)")]
    Authentication,
}

/// Key vault errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("key vault unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Opaque symmetric key.
///
/// The raw bytes never leave this module; the key can only be used through
/// [`EncryptionKey::encrypt`] and [`EncryptionKey::decrypt`].
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl EncryptionKey {
    fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(bytes.as_mut());
        Self { bytes }
    }

    fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != KEY_LEN {
            return None;
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(slice);
        Some(Self { bytes })
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(self.bytes.as_ref()))
    }

    /// Seal `plaintext` into a self-describing blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(BLOB_MAGIC);
        header.extend_from_slice(&BLOB_VERSION.to_le_bytes());

        let ciphertext = self
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|_| CipherError::Encrypt)?;

        let mut blob = header;
        blob.reserve(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Open a blob produced by [`EncryptionKey::encrypt`].
    ///
    /// Any mismatch (wrong key, modified header, flipped ciphertext bit)
    /// fails the whole blob.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        if blob.len() < HEADER_LEN + NONCE_LEN {
            return Err(CipherError::Truncated(blob.len()));
        }
        let (header, rest) = blob.split_at(HEADER_LEN);
        if &header[..BLOB_MAGIC.len()] != BLOB_MAGIC {
            return Err(CipherError::BadMagic);
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&header[BLOB_MAGIC.len()..]);
        let version = u32::from_le_bytes(version);
        if version != BLOB_VERSION {
            return Err(CipherError::UnsupportedVersion(version));
        }

        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| CipherError::Authentication)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([redacted])")
    }
}

/// Manages the lifecycle of the session key.
///
/// Creation is single-flight: the vault lock is held across the
/// read-generate-persist sequence, so concurrent callers always observe the
/// same key.
pub struct KeyVault {
    store: Arc<dyn SecureKeyStore>,
    key_id: String,
    cached: Mutex<Option<EncryptionKey>>,
}

impl KeyVault {
    /// Create a vault over `store` using the default key id.
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self::with_key_id(store, VAULT_KEY_ID)
    }

    /// Create a vault storing its key under `key_id`.
    pub fn with_key_id(store: Arc<dyn SecureKeyStore>, key_id: &str) -> Self {
        Self {
            store,
            key_id: key_id.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Return the session key, generating and persisting it first if absent.
    pub fn get_or_create_key(&self) -> Result<EncryptionKey, VaultError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let stored = self
            .store
            .get(&self.key_id)
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;

        let key = match stored {
            Some(bytes) => {
                debug!("Loaded session key from secure store");
                EncryptionKey::from_slice(&bytes).ok_or_else(|| {
                    warn!("Stored session key has invalid length {}", bytes.len());
                    VaultError::Unavailable("stored key is malformed".to_string())
                })?
            }
            None => {
                let key = EncryptionKey::generate();
                self.store
                    .set(&self.key_id, key.bytes.as_ref(), AccessPolicy::ThisDeviceOnly)
                    .map_err(|e| VaultError::Unavailable(e.to_string()))?;
                info!("Generated new session key");
                key
            }
        };

        *cached = Some(key.clone());
        Ok(key)
    }

    /// Delete the session key. A missing key is not an error.
    pub fn destroy_key(&self) -> Result<(), VaultError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
        self.store
            .delete(&self.key_id)
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;
        info!("Session key destroyed");
        Ok(())
    }

    /// Encrypt `plaintext` under the session key.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        Ok(self.get_or_create_key()?.encrypt(plaintext)?)
    }

    /// Decrypt a blob sealed under the session key.
    pub fn open(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        Ok(self.get_or_create_key()?.decrypt(blob)?)
    }
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}
