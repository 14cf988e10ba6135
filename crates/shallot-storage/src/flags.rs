//! Named boolean feature flags, persisted as one JSON map.

use crate::kv::{KvStore, StoreError};
use crate::FEATURE_FLAGS_KEY;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FlagsError {
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type FeatureFlags = BTreeMap<String, bool>;

pub struct FeatureFlagsStore {
    kv: Arc<dyn KvStore>,
    lock: Mutex<()>,
}

impl FeatureFlagsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    /// Every stored flag. Unreadable state reads as no flags.
    pub fn get_all(&self) -> FeatureFlags {
        match self.read() {
            Ok(flags) => flags,
            Err(e) => {
                warn!("Failed to read feature flags: {}", e);
                FeatureFlags::new()
            }
        }
    }

    /// Unknown flags are off.
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.get_all().get(flag).copied().unwrap_or(false)
    }

    pub fn set(&self, flag: &str, enabled: bool) -> Result<(), FlagsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut flags = self.read()?;
        flags.insert(flag.to_string(), enabled);
        let json = serde_json::to_vec(&flags)
            .map_err(|e| FlagsError::Serialization(e.to_string()))?;
        self.kv.set(FEATURE_FLAGS_KEY, &json)?;
        debug!("Feature flag '{}' = {}", flag, enabled);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), FlagsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.kv.remove(FEATURE_FLAGS_KEY)?;
        Ok(())
    }

    fn read(&self) -> Result<FeatureFlags, FlagsError> {
        let Some(raw) = self.kv.get(FEATURE_FLAGS_KEY)? else {
            return Ok(FeatureFlags::new());
        };
        match serde_json::from_slice(&raw) {
            Ok(flags) => Ok(flags),
            Err(e) => {
                warn!("Ignoring undecodable feature flags: {}", e);
                Ok(FeatureFlags::new())
            }
        }
    }
}

impl std::fmt::Debug for FeatureFlagsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlagsStore").finish_non_exhaustive()
    }
}
