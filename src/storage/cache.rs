//! TTL-aware cache on top of [`DocumentStore`].
//!
//! Entries are stored whole under `<namespace>/<key>`; a lookup that finds an
//! expired entry deletes it and reports a miss.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::DocumentStore;

/// Ten years; keeps `expires_at` representable
const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct TtlCache<T> {
    store: DocumentStore,
    namespace: String,
    _value: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TtlCache<T> {
    pub fn new(store: DocumentStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            _value: PhantomData,
        }
    }

    fn path(&self, key: &str) -> String {
        format!("{}/{}", self.namespace, key)
    }

    fn prefix(&self) -> String {
        format!("{}/", self.namespace)
    }

    /// Live entry for `key`, evicting it if expired.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let path = self.path(key);
        let Some(entry) = self.store.read::<CacheEntry<T>>(&path)? else {
            return Ok(None);
        };
        if entry.is_expired_at(Utc::now()) {
            tracing::debug!(key, expired_at = %entry.expires_at, "evicting expired cache entry");
            self.store.delete(&path)?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get_entry(key)?.map(|e| e.value))
    }

    /// Insert or replace `key`, expiring `ttl_seconds` from now.
    pub fn set(&self, key: &str, value: T, ttl_seconds: u64) -> Result<()> {
        let now = Utc::now();
        let ttl = Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64);
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at: now,
            expires_at: now + ttl,
        };
        self.store.write(&self.path(key), &entry)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.path(key))
    }

    /// Drop every entry in this namespace. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let paths = self.store.list(&self.prefix())?;
        for p in &paths {
            self.store.delete(p)?;
        }
        Ok(paths.len())
    }

    /// Remove expired entries (and ones that no longer decode). Returns the
    /// number removed.
    pub fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for (path, bytes) in self.store.scan_raw(&self.prefix())? {
            let stale = match serde_json::from_slice::<CacheEntry<serde_json::Value>>(&bytes) {
                Ok(entry) => entry.is_expired_at(now),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "dropping undecodable cache entry");
                    true
                }
            };
            if stale && self.store.delete(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
