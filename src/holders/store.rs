//! Holder Store: time-boxed holder snapshots keyed by the collection filters.

use anyhow::Result;

use crate::storage::{CacheEntry, DocumentStore, TtlCache};
use crate::types::HolderRecord;

const HOLDER_NAMESPACE: &str = "holders";

/// Replace every non-alphanumeric character with `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub struct HolderStore {
    cache: TtlCache<Vec<HolderRecord>>,
}

impl HolderStore {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            cache: TtlCache::new(store, HOLDER_NAMESPACE),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<HolderRecord>>> {
        self.cache.get(&sanitize_key(key))
    }

    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<Vec<HolderRecord>>>> {
        self.cache.get_entry(&sanitize_key(key))
    }

    pub fn put(&self, key: &str, holders: &[HolderRecord], ttl_seconds: u64) -> Result<()> {
        self.cache.set(&sanitize_key(key), holders.to_vec(), ttl_seconds)
    }

    pub fn clear(&self) -> Result<usize> {
        self.cache.clear()
    }

    pub fn evict_expired(&self) -> Result<usize> {
        self.cache.evict_expired()
    }
}
