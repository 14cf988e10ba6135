//! Shallot Storage
//!
//! Persistence for the privacy session core.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐     ┌──────────────────┐
//! │ SecureSession-   │────▶│   KeyVault    │────▶│ SecureKeyStore   │
//! │ Store            │     │ (256-bit key) │     │ (OS keychain)    │
//! └────────┬─────────┘     └───────────────┘     └──────────────────┘
//!          │ encrypted blob
//!          ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ KvStore   shallot:tabs | shallot:settings | shallot:sitePrefs ...│
//! └──────────────────────────────────────────────────────────────────┘
//!          ▲                         ▲
//!   SettingsStore (plaintext)   SitePrefsStore (plaintext)
//! ```
//!
//! The session is sealed as a single XChaCha20-Poly1305 blob. Destroying the
//! vault key is what makes a wipe irreversible; deleting the blob afterwards
//! only reclaims space.

mod flags;
mod keystore;
mod kv;
mod session;
mod settings;
mod site_prefs;
mod vault;

pub use flags::{FeatureFlags, FeatureFlagsStore, FlagsError};
pub use keystore::{AccessPolicy, KeyStoreError, KeyringStore, MemoryKeyStore, SecureKeyStore};
pub use kv::{FileKvStore, KvStore, MemoryKvStore, StoreError};
pub use session::{
    LoadedSession, SecureSessionStore, Session, SessionConfig, SessionError, SessionRecord,
    SessionUnreadable,
};
pub use settings::{
    BridgeType, DEFAULT_DOH_PROVIDER, FingerprintProtections, PartialSettings,
    SETTINGS_SCHEMA_VERSION, SafeBrowsing, SearchEngine, Settings, SettingsError, SettingsStore,
};
pub use site_prefs::{Permission, SitePreference, SitePrefsError, SitePrefsStore, normalize_origin};
pub use vault::{CipherError, EncryptionKey, KeyVault, VaultError};

/// Key of the encrypted session blob
pub const SESSION_KEY: &str = "shallot:tabs";
/// Key of the plaintext settings record
pub const SETTINGS_KEY: &str = "shallot:settings";
/// Key of the plaintext site preference list
pub const SITE_PREFS_KEY: &str = "shallot:sitePrefs";
/// Key of the plaintext feature flag map
pub const FEATURE_FLAGS_KEY: &str = "shallot:featureFlags";
/// Identifier of the session key inside the secure key store
pub const VAULT_KEY_ID: &str = "shallot:aesKey";
