//! Per-origin permission overrides.

use crate::kv::{KvStore, StoreError};
use crate::SITE_PREFS_KEY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum SitePrefsError {
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Allow,
    Block,
    Ask,
}

/// Overrides for a single origin. Unset fields defer to global settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePreference {
    pub origin: String,
    #[serde(rename = "disableJS", default, skip_serializing_if = "Option::is_none")]
    pub disable_js: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SitePreference {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            disable_js: None,
            camera: None,
            mic: None,
            notifications: None,
            created_at: None,
        }
    }
}

/// Reduce `input` to `scheme://host[:port]`.
///
/// Bare hosts such as `example.com` are treated as https.
pub fn normalize_origin(input: &str) -> Result<String, SitePrefsError> {
    let trimmed = input.trim();
    let tuple_origin = |candidate: &str| {
        Url::parse(candidate)
            .ok()
            .map(|url| url.origin())
            .filter(|origin| origin.is_tuple())
    };

    tuple_origin(trimmed)
        .or_else(|| tuple_origin(&format!("https://{trimmed}")))
        .map(|origin| origin.ascii_serialization())
        .ok_or_else(|| SitePrefsError::InvalidOrigin(input.to_string()))
}

/// Store of [`SitePreference`] entries, one per origin, kept as one JSON list.
pub struct SitePrefsStore {
    kv: Arc<dyn KvStore>,
    lock: Mutex<()>,
}

impl SitePrefsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    /// Preference for `origin`, if any.
    pub fn get(&self, origin: &str) -> Result<Option<SitePreference>, SitePrefsError> {
        let origin = normalize_origin(origin)?;
        Ok(self.read()?.into_iter().find(|p| p.origin == origin))
    }

    /// Insert or replace the preference for `pref.origin`.
    pub fn set(&self, mut pref: SitePreference) -> Result<SitePreference, SitePrefsError> {
        pref.origin = normalize_origin(&pref.origin)?;
        if pref.created_at.is_none() {
            pref.created_at = Some(Utc::now());
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.read()?;
        all.retain(|p| p.origin != pref.origin);
        all.push(pref.clone());
        self.write(&all)?;
        debug!("Saved site preference for {}", pref.origin);
        Ok(pref)
    }

    /// Remove the preference for `origin`. Returns whether one existed.
    pub fn remove(&self, origin: &str) -> Result<bool, SitePrefsError> {
        let origin = normalize_origin(origin)?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.read()?;
        let before = all.len();
        all.retain(|p| p.origin != origin);
        if all.len() == before {
            return Ok(false);
        }
        self.write(&all)?;
        Ok(true)
    }

    pub fn get_all(&self) -> Result<Vec<SitePreference>, SitePrefsError> {
        self.read()
    }

    /// Remove every preference.
    pub fn clear(&self) -> Result<(), SitePrefsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.kv.remove(SITE_PREFS_KEY)?;
        info!("Site preferences cleared");
        Ok(())
    }

    fn read(&self) -> Result<Vec<SitePreference>, SitePrefsError> {
        let Some(raw) = self.kv.get(SITE_PREFS_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_slice(&raw) {
            Ok(all) => Ok(all),
            Err(e) => {
                warn!("Ignoring undecodable site preferences: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, all: &[SitePreference]) -> Result<(), SitePrefsError> {
        let json =
            serde_json::to_vec(all).map_err(|e| SitePrefsError::Serialization(e.to_string()))?;
        self.kv.set(SITE_PREFS_KEY, &json)?;
        Ok(())
    }
}

impl std::fmt::Debug for SitePrefsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SitePrefsStore").finish_non_exhaustive()
    }
}
