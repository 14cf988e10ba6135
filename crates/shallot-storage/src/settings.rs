//! Browser settings with change notification.
//!
//! Settings are a flat record persisted as JSON under [`SETTINGS_KEY`].
//! Anything missing from the persisted record falls back to
//! [`Settings::default`], so a stored record from an older build still reads.

use crate::kv::{KvStore, StoreError};
use crate::SETTINGS_KEY;
use serde::{Deserialize, Deserializer, Serialize};
use shallot_events::{Subscribers, Subscription};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Version written alongside persisted settings
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// DNS-over-HTTPS endpoint suggested when the user enables DoH
pub const DEFAULT_DOH_PROVIDER: &str = "https://dns.google/dns-query";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to persist settings: {0}")]
    PersistenceFailed(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    #[default]
    Duckduckgo,
    Google,
    Startpage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeBrowsing {
    Off,
    #[default]
    Standard,
    Enhanced,
}

/// Pluggable transport used to reach the proxy network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeType {
    None,
    #[default]
    Obfs4,
    Meek,
    Snowflake,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintProtections {
    pub canvas: bool,
    pub webgl: bool,
    pub audio: bool,
}

impl Default for FingerprintProtections {
    fn default() -> Self {
        Self {
            canvas: true,
            webgl: true,
            audio: true,
        }
    }
}

/// Complete settings view. Every field always has a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub use_tor: bool,
    pub incognito_mode: bool,
    pub default_search_engine: SearchEngine,
    pub https_only: bool,
    #[serde(rename = "disableJS")]
    pub disable_js: bool,
    pub first_party_isolation: bool,
    pub doh_provider: Option<String>,
    pub safe_browsing: SafeBrowsing,
    pub clear_on_exit: bool,
    pub fingerprint_protections: FingerprintProtections,
    pub telemetry_enabled: bool,
    pub high_contrast: bool,
    pub bridge_type: BridgeType,
    pub custom_bridge: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_tor: false,
            incognito_mode: false,
            default_search_engine: SearchEngine::Duckduckgo,
            https_only: true,
            disable_js: false,
            first_party_isolation: false,
            doh_provider: None,
            safe_browsing: SafeBrowsing::Standard,
            clear_on_exit: true,
            fingerprint_protections: FingerprintProtections::default(),
            telemetry_enabled: false,
            high_contrast: false,
            bridge_type: BridgeType::Obfs4,
            custom_bridge: String::new(),
        }
    }
}

impl Settings {
    /// Apply a shallow merge-patch: every field present in `patch` wins.
    pub fn merge(&self, patch: &PartialSettings) -> Self {
        let mut merged = self.clone();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &patch.$field {
                    merged.$field = value.clone();
                })*
            };
        }
        apply!(
            use_tor,
            incognito_mode,
            default_search_engine,
            https_only,
            disable_js,
            first_party_isolation,
            doh_provider,
            safe_browsing,
            clear_on_exit,
            fingerprint_protections,
            telemetry_enabled,
            high_contrast,
            bridge_type,
            custom_bridge,
        );
        merged
    }
}

/// Patch for [`SettingsStore::set`]. `None` leaves a field unchanged.
///
/// `doh_provider: Some(None)` clears the provider; in JSON that is an
/// explicit `"dohProvider": null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_tor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incognito_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_search_engine: Option<SearchEngine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_only: Option<bool>,
    #[serde(rename = "disableJS", skip_serializing_if = "Option::is_none")]
    pub disable_js: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_party_isolation: Option<bool>,
    #[serde(
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub doh_provider: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_browsing: Option<SafeBrowsing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_on_exit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_protections: Option<FingerprintProtections>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_contrast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_type: Option<BridgeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_bridge: Option<String>,
}

fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// On-disk record: overrides plus the schema version they were written with.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(flatten)]
    overrides: PartialSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettingsRef<'a> {
    schema_version: u32,
    #[serde(flatten)]
    settings: &'a Settings,
}

/// Persistent settings with synchronous change notification.
pub struct SettingsStore {
    kv: Arc<dyn KvStore>,
    lock: Mutex<()>,
    subscribers: Subscribers<Settings>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
            subscribers: Subscribers::new(),
        }
    }

    /// Current settings. Never fails: unreadable state reads as defaults.
    pub fn get(&self) -> Settings {
        match self.read() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to read settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Merge `patch` into the current settings, persist, and notify.
    ///
    /// Subscribers have been notified when this returns `Ok`. On error nothing
    /// changed and nobody was notified.
    pub fn set(&self, patch: &PartialSettings) -> Result<Settings, SettingsError> {
        let merged = {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let merged = self.read()?.merge(patch);
            self.write(&merged)?;
            merged
        };
        debug!("Settings updated");
        self.subscribers.notify(&merged);
        Ok(merged)
    }

    /// Replace all overrides with the defaults in one write.
    ///
    /// Like [`set`](Self::set), a failed write leaves the stored settings
    /// untouched and notifies nobody.
    pub fn reset(&self) -> Result<Settings, SettingsError> {
        let defaults = Settings::default();
        {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.write(&defaults)?;
        }
        info!("Settings reset to defaults");
        self.subscribers.notify(&defaults);
        Ok(defaults)
    }

    /// Set or clear the DNS-over-HTTPS provider.
    pub fn set_doh_provider(&self, provider: Option<String>) -> Result<Settings, SettingsError> {
        self.set(&PartialSettings {
            doh_provider: Some(provider),
            ..Default::default()
        })
    }

    /// Receive every settings value produced by `set` or `reset`.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Settings) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    /// Read persisted settings. Backend failures propagate; an undecodable
    /// record reads as defaults.
    fn read(&self) -> Result<Settings, SettingsError> {
        let Some(raw) = self.kv.get(SETTINGS_KEY)? else {
            return Ok(Settings::default());
        };

        match serde_json::from_slice::<StoredSettings>(&raw) {
            Ok(stored) => {
                if let Some(version) = stored.schema_version {
                    if version > SETTINGS_SCHEMA_VERSION {
                        warn!(
                            "Settings written by newer schema {} (supported {})",
                            version, SETTINGS_SCHEMA_VERSION
                        );
                    }
                }
                Ok(Settings::default().merge(&stored.overrides))
            }
            Err(e) => {
                warn!("Ignoring undecodable settings: {}", e);
                Ok(Settings::default())
            }
        }
    }

    fn write(&self, settings: &Settings) -> Result<(), SettingsError> {
        let stored = StoredSettingsRef {
            schema_version: SETTINGS_SCHEMA_VERSION,
            settings,
        };
        let json = serde_json::to_vec(&stored)
            .map_err(|e| SettingsError::Serialization(e.to_string()))?;
        self.kv.set(SETTINGS_KEY, &json)?;
        Ok(())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakyKv {
        inner: MemoryKvStore,
        fail_writes: AtomicBool,
    }

    impl KvStore for FlakyKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("quota exceeded".into()));
            }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn patch_json(json: &str) -> PartialSettings {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_get_returns_defaults_when_empty() {
        let store = SettingsStore::new(Arc::new(MemoryKvStore::new()));
        let settings = store.get();
        assert_eq!(settings, Settings::default());
        assert!(settings.https_only);
        assert!(settings.clear_on_exit);
        assert_eq!(settings.bridge_type, BridgeType::Obfs4);
        assert_eq!(settings.doh_provider, None);
    }

    #[test]
    fn test_set_accumulates_patches() {
        let store = SettingsStore::new(Arc::new(MemoryKvStore::new()));

        store.set(&patch_json(r#"{"httpsOnly": false}"#)).unwrap();
        store.set(&patch_json(r#"{"useTor": true, "safeBrowsing": "enhanced"}"#)).unwrap();
        let settings = store.set(&patch_json(r#"{"disableJS": true}"#)).unwrap();

        let expected = Settings {
            https_only: false,
            use_tor: true,
            safe_browsing: SafeBrowsing::Enhanced,
            disable_js: true,
            ..Settings::default()
        };
        assert_eq!(settings, expected);
        assert_eq!(store.get(), expected);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = SettingsStore::new(kv.clone());
        store.set(&patch_json(r#"{"incognitoMode": true, "customBridge": "x"}"#)).unwrap();

        assert_eq!(store.reset().unwrap(), Settings::default());
        assert_eq!(store.get(), Settings::default());
        // Defaults are written explicitly
        assert!(kv.contains(SETTINGS_KEY));
    }

    #[test]
    fn test_subscribers_see_every_change() {
        let store = SettingsStore::new(Arc::new(MemoryKvStore::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let _sub = store.subscribe(move |settings: &Settings| {
            s.lock().unwrap().push(settings.use_tor);
        });

        store.set(&patch_json(r#"{"useTor": true}"#)).unwrap();
        store.reset().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_failed_write_neither_changes_nor_notifies() {
        let kv = Arc::new(FlakyKv::default());
        let store = SettingsStore::new(kv.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let _sub = store.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        kv.fail_writes.store(true, Ordering::SeqCst);
        let err = store.set(&patch_json(r#"{"httpsOnly": false}"#)).unwrap_err();
        assert!(matches!(err, SettingsError::PersistenceFailed(_)));
        assert!(store.reset().is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.get().https_only);
    }

    #[test]
    fn test_failed_reset_keeps_overrides() {
        let kv = Arc::new(FlakyKv::default());
        let store = SettingsStore::new(kv.clone());
        let last_seen = Arc::new(Mutex::new(None));

        let s = last_seen.clone();
        let _sub = store.subscribe(move |settings: &Settings| {
            *s.lock().unwrap() = Some(settings.https_only);
        });
        store.set(&patch_json(r#"{"httpsOnly": false}"#)).unwrap();

        kv.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(store.reset(), Err(SettingsError::PersistenceFailed(_))));

        // Stored state, get() and subscribers all still agree
        assert!(!store.get().https_only);
        assert_eq!(*last_seen.lock().unwrap(), Some(false));

        kv.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(store.reset().unwrap(), Settings::default());
        assert_eq!(*last_seen.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_undecodable_record_reads_as_defaults() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(SETTINGS_KEY, b"{not json").unwrap();
        let store = SettingsStore::new(kv);

        assert_eq!(store.get(), Settings::default());
        // A later set overwrites the broken record
        let settings = store.set(&patch_json(r#"{"highContrast": true}"#)).unwrap();
        assert!(settings.high_contrast);
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(SETTINGS_KEY, br#"{"useTor": true, "selectedBridge": "meek"}"#).unwrap();
        let store = SettingsStore::new(kv);

        let settings = store.get();
        assert!(settings.use_tor);
        assert!(settings.https_only);
        assert_eq!(settings.bridge_type, BridgeType::Obfs4);
    }

    #[test]
    fn test_persisted_shape() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = SettingsStore::new(kv.clone());
        store.set(&patch_json(r#"{"disableJS": true}"#)).unwrap();

        let raw = kv.get(SETTINGS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["schemaVersion"], 1);
        assert_eq!(value["disableJS"], true);
        assert_eq!(value["fingerprintProtections"]["webgl"], true);
        assert_eq!(value["defaultSearchEngine"], "duckduckgo");
    }

    #[test]
    fn test_doh_provider_set_and_clear() {
        let store = SettingsStore::new(Arc::new(MemoryKvStore::new()));

        let settings = store.set_doh_provider(Some(DEFAULT_DOH_PROVIDER.to_string())).unwrap();
        assert_eq!(settings.doh_provider.as_deref(), Some(DEFAULT_DOH_PROVIDER));

        // Omitted field leaves the provider alone
        store.set(&patch_json(r#"{"useTor": true}"#)).unwrap();
        assert!(store.get().doh_provider.is_some());

        // Explicit null clears it
        let settings = store.set(&patch_json(r#"{"dohProvider": null}"#)).unwrap();
        assert_eq!(settings.doh_provider, None);
    }

    fn arb_patch() -> impl Strategy<Value = PartialSettings> {
        let toggles = (
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
            any::<Option<bool>>(),
        );
        let choices = (
            proptest::option::of(prop_oneof![
                Just(SearchEngine::Duckduckgo),
                Just(SearchEngine::Google),
                Just(SearchEngine::Startpage),
            ]),
            proptest::option::of(proptest::option::of("https://[a-z]{1,8}\\.example/dns-query")),
            proptest::option::of(prop_oneof![
                Just(SafeBrowsing::Off),
                Just(SafeBrowsing::Standard),
                Just(SafeBrowsing::Enhanced),
            ]),
            proptest::option::of(any::<(bool, bool, bool)>().prop_map(|(canvas, webgl, audio)| {
                FingerprintProtections {
                    canvas,
                    webgl,
                    audio,
                }
            })),
            proptest::option::of(prop_oneof![
                Just(BridgeType::None),
                Just(BridgeType::Obfs4),
                Just(BridgeType::Meek),
                Just(BridgeType::Snowflake),
                Just(BridgeType::Custom),
            ]),
            proptest::option::of("[a-z0-9 :.]{0,24}"),
        );

        (toggles, choices).prop_map(
            |(
                (
                    use_tor,
                    incognito_mode,
                    https_only,
                    disable_js,
                    first_party_isolation,
                    clear_on_exit,
                    telemetry_enabled,
                    high_contrast,
                ),
                (
                    default_search_engine,
                    doh_provider,
                    safe_browsing,
                    fingerprint_protections,
                    bridge_type,
                    custom_bridge,
                ),
            )| PartialSettings {
                use_tor,
                incognito_mode,
                default_search_engine,
                https_only,
                disable_js,
                first_party_isolation,
                doh_provider,
                safe_browsing,
                clear_on_exit,
                fingerprint_protections,
                telemetry_enabled,
                high_contrast,
                bridge_type,
                custom_bridge,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_any_patch_sequence_folds_over_defaults(
            patches in prop::collection::vec(arb_patch(), 0..10)
        ) {
            let store = SettingsStore::new(Arc::new(MemoryKvStore::new()));
            let mut expected = Settings::default();
            for patch in &patches {
                expected = expected.merge(patch);
                prop_assert_eq!(store.set(patch).unwrap(), expected.clone());
            }
            prop_assert_eq!(store.get(), expected);
        }

        #[test]
        fn test_reset_after_any_patches_yields_defaults(
            patches in prop::collection::vec(arb_patch(), 0..10)
        ) {
            let store = SettingsStore::new(Arc::new(MemoryKvStore::new()));
            for patch in &patches {
                store.set(patch).unwrap();
            }
            prop_assert_eq!(store.reset().unwrap(), Settings::default());
            prop_assert_eq!(store.get(), Settings::default());
        }
    }
}
