//! External secure key store.
//!
//! The vault never persists key material itself; it hands raw bytes to a
//! `SecureKeyStore`. On desktop this is the OS keychain through `keyring`,
//! which only stores strings, so secrets are base64-encoded on the way in.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use keyring::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

/// Service name used for OS keychain entries
const SERVICE_NAME: &str = "ShallotSurf";

/// Access policy requested when storing a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Bound to this device, readable by this app whenever it runs
    /// (never synced or included in backups)
    ThisDeviceOnly,
}

/// Failure reported by the underlying key store
#[derive(Debug, Clone, Error)]
#[error("secure key store: {0}")]
pub struct KeyStoreError(pub String);

/// Device-bound secret storage.
pub trait SecureKeyStore: Send + Sync {
    /// Fetch the secret stored under `id`, `None` if absent.
    fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError>;

    /// Store `secret` under `id`, replacing any previous value.
    fn set(&self, id: &str, secret: &[u8], policy: AccessPolicy) -> Result<(), KeyStoreError>;

    /// Delete `id`. Succeeds when nothing is stored.
    fn delete(&self, id: &str) -> Result<(), KeyStoreError>;
}

/// OS keychain (Secret Service, macOS Keychain, Windows Credential Manager).
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keychain service name (one per profile).
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, id: &str) -> Result<Entry, KeyStoreError> {
        Entry::new(&self.service, id).map_err(|e| KeyStoreError(format!("keyring init: {e}")))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureKeyStore for KeyringStore {
    fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        let encoded = match self.entry(id)?.get_password() {
            Ok(encoded) => Zeroizing::new(encoded),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(KeyStoreError(format!("load secret: {e}"))),
        };
        let decoded = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| KeyStoreError(format!("decode secret: {e}")))?;
        Ok(Some(Zeroizing::new(decoded)))
    }

    fn set(&self, id: &str, secret: &[u8], policy: AccessPolicy) -> Result<(), KeyStoreError> {
        // Keychain entries are per-user and never synced by this backend,
        // which already satisfies ThisDeviceOnly.
        debug!("Storing secret '{}' ({:?})", id, policy);
        let encoded = Zeroizing::new(BASE64.encode(secret));
        self.entry(id)?
            .set_password(&encoded)
            .map_err(|e| KeyStoreError(format!("store secret: {e}")))
    }

    fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        match self.entry(id)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyStoreError(format!("delete secret: {e}"))),
        }
    }
}

/// In-process key store for ephemeral profiles and tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    secrets: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a secret is stored under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        let secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(secrets.get(id).cloned())
    }

    fn set(&self, id: &str, secret: &[u8], _policy: AccessPolicy) -> Result<(), KeyStoreError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets.insert(id.to_string(), Zeroizing::new(secret.to_vec()));
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), KeyStoreError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets.remove(id);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryKeyStore([redacted])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_key_store() {
        let store = MemoryKeyStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.set("k", &[7u8; 32], AccessPolicy::ThisDeviceOnly).unwrap();
        assert!(store.contains("k"));
        assert_eq!(store.get("k").unwrap().unwrap().as_slice(), &[7u8; 32]);

        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(!store.contains("k"));
    }

    #[test]
    fn test_memory_key_store_debug_is_redacted() {
        let store = MemoryKeyStore::new();
        store.set("k", b"secret", AccessPolicy::ThisDeviceOnly).unwrap();
        assert!(!format!("{:?}", store).contains("secret"));
    }
}
