//! Encrypted tab session persistence.
//!
//! The whole session is serialized to JSON, sealed by the [`KeyVault`] and
//! stored base64-encoded under [`SESSION_KEY`]. Saves are debounced: the first
//! save in a quiet period arms a timer, later saves only replace the pending
//! payload, and the timer writes the latest payload once.

use crate::kv::{KvStore, StoreError};
use crate::vault::{KeyVault, VaultError};
use crate::SESSION_KEY;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// The stored session could not be read and was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session unreadable: {reason}")]
pub struct SessionUnreadable {
    pub reason: String,
}

/// One open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// New record with a fresh id.
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            title,
            created_at: Utc::now(),
        }
    }
}

/// Ordered list of open pages. Ids are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    records: Vec<SessionRecord>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session, keeping the last record for each duplicated id.
    pub fn from_records(records: impl IntoIterator<Item = SessionRecord>) -> Self {
        let mut session = Self::new();
        for record in records {
            session.upsert(record);
        }
        session
    }

    /// Insert `record` at the end, replacing any record with the same id.
    pub fn upsert(&mut self, record: SessionRecord) {
        self.records.retain(|r| r.id != record.id);
        self.records.push(record);
    }

    /// Remove the record with `id`. Returns true if one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Session persistence tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Debounce window for saves, in milliseconds
    pub debounce_ms: u64,
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// Result of [`SecureSessionStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSession {
    pub session: Session,
    /// Set when a stored session existed but had to be discarded
    pub warning: Option<SessionUnreadable>,
}

struct ArmedTimer {
    token: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    current: Session,
    pending: Option<Session>,
    timer: Option<ArmedTimer>,
    next_token: u64,
    /// Bumped by every wipe; writes queued under an older epoch are dropped
    epoch: u64,
    /// Bumped by every save and wipe
    generation: u64,
}

struct Inner {
    vault: Arc<KeyVault>,
    kv: Arc<dyn KvStore>,
    config: SessionConfig,
    io: tokio::sync::Mutex<()>,
    state: Mutex<State>,
}

/// Encrypted, debounced store for the open-tab session.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct SecureSessionStore {
    inner: Arc<Inner>,
}

impl SecureSessionStore {
    pub fn new(vault: Arc<KeyVault>, kv: Arc<dyn KvStore>, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                vault,
                kv,
                config,
                io: tokio::sync::Mutex::new(()),
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the persisted session.
    ///
    /// A payload still waiting on the debounce timer is returned as-is.
    /// Unreadable ciphertext yields an empty session plus a warning; only an
    /// unavailable key vault or a failing backend is an error.
    ///
    /// A save or wipe that lands while the backend is being read wins over
    /// the stored copy.
    pub async fn load(&self) -> Result<LoadedSession, SessionError> {
        let _io = self.inner.io.lock().await;
        let generation = {
            let state = self.state();
            if let Some(pending) = state.pending.clone() {
                return Ok(LoadedSession {
                    session: pending,
                    warning: None,
                });
            }
            state.generation
        };

        let loaded = self.read()?;

        let mut state = self.state();
        if state.generation != generation {
            return Ok(LoadedSession {
                session: state.current.clone(),
                warning: None,
            });
        }
        state.current = loaded.session.clone();
        Ok(loaded)
    }

    /// Replace the whole session. The write happens after the debounce window.
    pub fn save(&self, session: Session) {
        let mut state = self.state();
        state.generation += 1;
        state.current = session.clone();
        state.pending = Some(session);

        if state.timer.is_some() {
            debug!("Session save coalesced into pending write");
            return;
        }

        match Handle::try_current() {
            Ok(handle) => self.arm_timer(&mut state, &handle),
            Err(_) => {
                // No runtime to drive the timer; write through
                drop(state);
                let _io = self.inner.io.blocking_lock();
                let pending = self.state().pending.take();
                if let Some(session) = pending {
                    if let Err(e) = self.write(&session) {
                        warn!("Session write failed: {}", e);
                    }
                }
            }
        }
    }

    /// Write any pending payload now.
    pub async fn flush(&self) -> Result<(), SessionError> {
        self.flush_pending(None).await
    }

    /// Destroy the session key and the stored ciphertext.
    ///
    /// Both steps are attempted. Any pending debounced write is cancelled and
    /// can no longer land.
    pub async fn wipe(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state();
            state.epoch += 1;
            state.generation += 1;
            state.pending = None;
            state.current = Session::new();
            if let Some(timer) = state.timer.take() {
                timer.task.abort();
            }
        }

        let _io = self.inner.io.lock().await;
        let key_result = self.inner.vault.destroy_key();
        let blob_result = self.inner.kv.remove(SESSION_KEY);

        match (key_result, blob_result) {
            (Ok(()), Ok(())) => {
                info!("Session wiped");
                Ok(())
            }
            (Err(key_err), blob_result) => {
                if let Err(blob_err) = blob_result {
                    warn!("Failed to remove stored session: {}", blob_err);
                }
                warn!("Failed to destroy session key: {}", key_err);
                Err(key_err.into())
            }
            (Ok(()), Err(blob_err)) => {
                warn!("Failed to remove stored session: {}", blob_err);
                Err(blob_err.into())
            }
        }
    }

    /// Add or replace a record, stamping its creation time.
    pub fn add(&self, mut record: SessionRecord) -> Session {
        record.created_at = Utc::now();
        let mut session = self.current();
        session.upsert(record);
        self.save(session.clone());
        session
    }

    /// Remove the record with `id`. Returns whether a record was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut session = self.current();
        if !session.remove(id) {
            return false;
        }
        self.save(session);
        true
    }

    /// Replace the session with `records`.
    pub fn set(&self, records: Vec<SessionRecord>) -> Session {
        let session = Session::from_records(records);
        self.save(session.clone());
        session
    }

    /// In-memory view of the session.
    pub fn current(&self) -> Session {
        self.state().current.clone()
    }

    fn arm_timer(&self, state: &mut State, handle: &Handle) {
        state.next_token += 1;
        let token = state.next_token;
        let epoch = state.epoch;
        let delay = self.inner.config.debounce();
        let store = self.clone();

        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.flush_pending(Some((token, epoch))).await {
                warn!("Debounced session write failed: {}", e);
            }
        });
        state.timer = Some(ArmedTimer { token, task });
    }

    /// `fired` carries the timer token and epoch when called from a timer.
    async fn flush_pending(&self, fired: Option<(u64, u64)>) -> Result<(), SessionError> {
        let _io = self.inner.io.lock().await;

        let (session, epoch) = {
            let mut state = self.state();
            match fired {
                Some((token, epoch)) => {
                    if epoch != state.epoch {
                        debug!("Dropping session write queued before wipe");
                        return Ok(());
                    }
                    if !state.timer.as_ref().is_some_and(|t| t.token == token) {
                        return Ok(());
                    }
                    state.timer = None;
                }
                None => {
                    if let Some(timer) = state.timer.take() {
                        timer.task.abort();
                    }
                }
            }
            match state.pending.take() {
                Some(session) => (session, state.epoch),
                None => return Ok(()),
            }
        };

        if let Err(e) = self.write(&session) {
            let mut state = self.state();
            if state.epoch == epoch && state.pending.is_none() {
                state.pending = Some(session);
                if state.timer.is_none() {
                    if let Ok(handle) = Handle::try_current() {
                        self.arm_timer(&mut state, &handle);
                    }
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn write(&self, session: &Session) -> Result<(), SessionError> {
        let json = Zeroizing::new(
            serde_json::to_vec(session).map_err(|e| SessionError::Serialization(e.to_string()))?,
        );
        let blob = self.inner.vault.seal(&json)?;
        self.inner.kv.set(SESSION_KEY, BASE64.encode(blob).as_bytes())?;
        debug!("Persisted session with {} record(s)", session.len());
        Ok(())
    }

    fn read(&self) -> Result<LoadedSession, SessionError> {
        let Some(stored) = self.inner.kv.get(SESSION_KEY)? else {
            return Ok(LoadedSession {
                session: Session::new(),
                warning: None,
            });
        };

        let blob = match BASE64.decode(&stored) {
            Ok(blob) => blob,
            Err(e) => return Ok(Self::unreadable(format!("bad encoding: {e}"))),
        };

        let plaintext = match self.inner.vault.open(&blob) {
            Ok(plaintext) => plaintext,
            Err(VaultError::Cipher(e)) => return Ok(Self::unreadable(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Session>(&plaintext) {
            Ok(session) => {
                debug!("Loaded session with {} record(s)", session.len());
                Ok(LoadedSession {
                    session,
                    warning: None,
                })
            }
            Err(e) => Ok(Self::unreadable(format!("bad payload: {e}"))),
        }
    }

    fn unreadable(reason: String) -> LoadedSession {
        warn!("Discarding unreadable session: {}", reason);
        LoadedSession {
            session: Session::new(),
            warning: Some(SessionUnreadable { reason }),
        }
    }
}

impl std::fmt::Debug for SecureSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SecureSessionStore")
            .field("records", &state.current.len())
            .field("pending", &state.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{AccessPolicy, KeyStoreError, MemoryKeyStore, SecureKeyStore};
    use crate::kv::MemoryKvStore;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    /// Memory store that counts writes to the session key and can fail removes
    #[derive(Default)]
    struct CountingKv {
        inner: MemoryKvStore,
        writes: AtomicUsize,
        fail_writes: AtomicBool,
        fail_removes: AtomicBool,
    }

    impl KvStore for CountingKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StoreError> {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("read-only".into()));
            }
            self.inner.remove(key)
        }
    }

    struct NoKeyStore;

    impl SecureKeyStore for NoKeyStore {
        fn get(&self, _: &str) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
            Err(KeyStoreError("locked".into()))
        }
        fn set(&self, _: &str, _: &[u8], _: AccessPolicy) -> Result<(), KeyStoreError> {
            Err(KeyStoreError("locked".into()))
        }
        fn delete(&self, _: &str) -> Result<(), KeyStoreError> {
            Err(KeyStoreError("locked".into()))
        }
    }

    fn store_with(kv: Arc<CountingKv>, debounce_ms: u64) -> SecureSessionStore {
        let vault = Arc::new(KeyVault::new(Arc::new(MemoryKeyStore::new())));
        SecureSessionStore::new(vault, kv, SessionConfig { debounce_ms })
    }

    fn tabs(urls: &[&str]) -> Session {
        Session::from_records(urls.iter().map(|u| SessionRecord::new(*u, None)))
    }

    #[tokio::test]
    async fn test_save_flush_load_round_trip() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 300);
        let session = tabs(&["https://a.example", "https://b.example"]);

        store.save(session.clone());
        store.flush().await.unwrap();
        assert_eq!(kv.writes.load(Ordering::SeqCst), 1);

        // Stored blob is not plaintext JSON
        let stored = kv.inner.get(SESSION_KEY).unwrap().unwrap();
        assert!(!String::from_utf8_lossy(&stored).contains("a.example"));

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.session, session);
        assert!(loaded.warning.is_none());
    }

    #[tokio::test]
    async fn test_load_absent_is_empty() {
        let store = store_with(Arc::new(CountingKv::default()), 300);
        let loaded = store.load().await.unwrap();
        assert!(loaded.session.is_empty());
        assert!(loaded.warning.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_blob_yields_warning() {
        let kv = Arc::new(CountingKv::default());
        kv.inner.set(SESSION_KEY, b"not base64 at all!").unwrap();
        let store = store_with(kv.clone(), 300);

        let loaded = store.load().await.unwrap();
        assert!(loaded.session.is_empty());
        assert!(loaded.warning.is_some());

        kv.inner.set(SESSION_KEY, BASE64.encode(b"SHSESS01garbage").as_bytes()).unwrap();
        let loaded = store.load().await.unwrap();
        assert!(loaded.session.is_empty());
        assert!(loaded.warning.is_some());
    }

    #[tokio::test]
    async fn test_tampered_blob_yields_warning() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 300);
        store.save(tabs(&["https://a.example"]));
        store.flush().await.unwrap();

        let stored = kv.inner.get(SESSION_KEY).unwrap().unwrap();
        let mut blob = BASE64.decode(&stored).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x80;
        kv.inner.set(SESSION_KEY, BASE64.encode(&blob).as_bytes()).unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.session.is_empty());
        assert!(loaded.warning.is_some());
    }

    #[tokio::test]
    async fn test_wipe_invalidates_old_ciphertext() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 300);
        store.save(tabs(&["https://a.example"]));
        store.flush().await.unwrap();
        let old = kv.inner.get(SESSION_KEY).unwrap().unwrap();

        store.wipe().await.unwrap();
        assert!(store.load().await.unwrap().session.is_empty());
        assert!(store.current().is_empty());

        // Restore the pre-wipe ciphertext; the fresh key cannot open it
        kv.inner.set(SESSION_KEY, &old).unwrap();
        let loaded = store.load().await.unwrap();
        assert!(loaded.session.is_empty());
        assert!(loaded.warning.is_some());
    }

    #[tokio::test]
    async fn test_wipe_with_failed_remove_still_unreadable() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 300);
        store.save(tabs(&["https://a.example"]));
        store.flush().await.unwrap();

        kv.fail_removes.store(true, Ordering::SeqCst);
        let err = store.wipe().await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));

        // Key is gone even though the blob remains
        assert!(store.load().await.unwrap().session.is_empty());
    }

    #[tokio::test]
    async fn test_saves_are_debounced() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 200);

        store.save(tabs(&["https://1.example"]));
        store.save(tabs(&["https://1.example", "https://2.example"]));
        let last = tabs(&["https://3.example"]);
        store.save(last.clone());
        assert_eq!(kv.writes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(kv.writes.load(Ordering::SeqCst), 1);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.session, last);
    }

    #[tokio::test]
    async fn test_wipe_supersedes_pending_save() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 50);

        store.save(tabs(&["https://late.example"]));
        store.wipe().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(kv.writes.load(Ordering::SeqCst), 0);
        assert!(!kv.inner.contains(SESSION_KEY));
    }

    #[tokio::test]
    async fn test_load_returns_pending_payload() {
        let store = store_with(Arc::new(CountingKv::default()), 10_000);
        let session = tabs(&["https://pending.example"]);
        store.save(session.clone());

        assert_eq!(store.load().await.unwrap().session, session);
    }

    #[tokio::test]
    async fn test_failed_write_is_requeued() {
        let kv = Arc::new(CountingKv::default());
        let store = store_with(kv.clone(), 10_000);
        let session = tabs(&["https://a.example"]);

        kv.fail_writes.store(true, Ordering::SeqCst);
        store.save(session.clone());
        assert!(matches!(store.flush().await, Err(SessionError::Persistence(_))));

        kv.fail_writes.store(false, Ordering::SeqCst);
        store.flush().await.unwrap();
        assert_eq!(kv.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap().session, session);
    }

    #[tokio::test]
    async fn test_vault_unavailable_is_error() {
        let kv = Arc::new(CountingKv::default());
        kv.inner.set(SESSION_KEY, b"c29tZXRoaW5n").unwrap();
        let vault = Arc::new(KeyVault::new(Arc::new(NoKeyStore)));
        let store = SecureSessionStore::new(vault, kv, SessionConfig::default());

        assert!(matches!(store.load().await, Err(SessionError::Vault(VaultError::Unavailable(_)))));
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let store = store_with(Arc::new(CountingKv::default()), 10_000);

        let record = SessionRecord::new("https://a.example", Some("A".into()));
        let id = record.id.clone();
        store.add(record);
        store.add(SessionRecord::new("https://b.example", None));
        assert_eq!(store.current().len(), 2);

        // Re-adding an id replaces the record and moves it last
        let mut updated = SessionRecord::new("https://a2.example", None);
        updated.id = id.clone();
        let session = store.add(updated);
        assert_eq!(session.len(), 2);
        assert_eq!(session.records()[1].url, "https://a2.example");

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert_eq!(store.current().len(), 1);

        store.flush().await.unwrap();
        assert_eq!(store.load().await.unwrap().session.len(), 1);
    }

    /// Memory store whose next `get` blocks until released
    #[derive(Default)]
    struct GatedKv {
        inner: MemoryKvStore,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl KvStore for GatedKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            let gate = self.gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_during_load_is_kept() {
        let kv = Arc::new(GatedKv::default());
        let vault = Arc::new(KeyVault::new(Arc::new(MemoryKeyStore::new())));
        let config = SessionConfig { debounce_ms: 10_000 };
        let store = SecureSessionStore::new(vault, kv.clone(), config);

        store.add(SessionRecord::new("https://a.example", None));
        store.flush().await.unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *kv.gate.lock().unwrap() = Some((entered_tx, release_rx));

        let loader = {
            let store = store.clone();
            tokio::spawn(async move { store.load().await })
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Lands while the backend read is in flight
        store.add(SessionRecord::new("https://b.example", None));
        release_tx.send(()).unwrap();

        let loaded = loader.await.unwrap().unwrap();
        assert_eq!(loaded.session.len(), 2);
        assert_eq!(store.current().len(), 2);

        store.add(SessionRecord::new("https://c.example", None));
        store.flush().await.unwrap();

        let urls: Vec<String> = store
            .load()
            .await
            .unwrap()
            .session
            .iter()
            .map(|r| r.url.clone())
            .collect();
        assert_eq!(urls, ["https://a.example", "https://b.example", "https://c.example"]);
    }

    #[test]
    fn test_record_json_is_camel_case() {
        let record = SessionRecord::new("https://a.example", None);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("title"));
    }

    fn arb_record() -> impl Strategy<Value = SessionRecord> {
        (
            "https://[a-z]{1,10}\\.example/[a-z0-9/]{0,12}",
            proptest::option::of("\\PC{0,24}"),
        )
            .prop_map(|(url, title)| SessionRecord::new(url, title))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_any_session_round_trips(records in prop::collection::vec(arb_record(), 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let session = Session::from_records(records);

            let loaded = runtime.block_on(async {
                let store = store_with(Arc::new(CountingKv::default()), 300);
                store.save(session.clone());
                store.flush().await.unwrap();
                store.load().await.unwrap()
            });

            prop_assert_eq!(loaded.session, session);
            prop_assert!(loaded.warning.is_none());
        }
    }
}
