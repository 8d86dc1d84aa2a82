//! Wallet Collector
//!
//! Fetches the holder set of an asset, filters it, and caches the result in
//! the [`HolderStore`]. A cache hit within TTL never touches the ledger.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::store::HolderStore;
use crate::chain::Ledger;
use crate::error::{DistributionError, Result};
use crate::types::{Address, HolderRecord};

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectOptions {
    pub asset: Address,
    /// Minimum balance, whole tokens
    pub threshold: f64,
    pub max_holders: Option<usize>,
    pub exclude: Vec<Address>,
    pub use_cache: bool,
    pub cache_ttl_seconds: u64,
}

impl CollectOptions {
    pub fn new(asset: Address) -> Self {
        Self {
            asset,
            threshold: 0.0,
            max_holders: None,
            exclude: Vec::new(),
            use_cache: true,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn max_holders(mut self, max: usize) -> Self {
        self.max_holders = Some(max);
        self
    }

    pub fn exclude(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.exclude.extend(addresses);
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache_ttl_seconds(mut self, ttl: u64) -> Self {
        self.cache_ttl_seconds = ttl;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DistributionError::validation(format!(
                "threshold must be >= 0, got {}",
                self.threshold
            )));
        }
        if self.max_holders == Some(0) {
            return Err(DistributionError::validation("max holders must be positive"));
        }
        if self.cache_ttl_seconds == 0 {
            return Err(DistributionError::validation("cache TTL must be positive"));
        }
        Ok(())
    }

    /// Deterministic key over every filter parameter. Exclusions are sorted
    /// and de-duplicated, then hashed to keep the key short.
    pub fn cache_key(&self) -> String {
        let max = self
            .max_holders
            .map(|m| m.to_string())
            .unwrap_or_else(|| "all".to_string());

        let mut excluded: Vec<String> = self.exclude.iter().map(|a| a.to_string()).collect();
        excluded.sort();
        excluded.dedup();
        let excluded = if excluded.is_empty() {
            "none".to_string()
        } else {
            bs58::encode(Sha256::digest(excluded.join(",").as_bytes())).into_string()
        };

        // -0.0 + 0.0 is +0.0, so both zeros share a key
        let threshold = self.threshold + 0.0;
        format!("holders_{}_{}_{}_{}", self.asset, threshold, max, excluded)
    }
}

/// Threshold, exclusion, descending-balance sort, then the size cap.
pub fn apply_filters(holders: Vec<HolderRecord>, options: &CollectOptions) -> Vec<HolderRecord> {
    let excluded: HashSet<Address> = options.exclude.iter().copied().collect();

    let mut kept: Vec<HolderRecord> = holders
        .into_iter()
        .filter(|h| h.balance > 0.0 && h.balance >= options.threshold)
        .filter(|h| !excluded.contains(&h.address))
        .collect();

    // stable: equal balances keep ledger order
    kept.sort_by(|a, b| b.balance.total_cmp(&a.balance));

    if let Some(max) = options.max_holders {
        kept.truncate(max);
    }
    kept
}

pub struct WalletCollector {
    ledger: Arc<dyn Ledger>,
    store: HolderStore,
}

impl WalletCollector {
    pub fn new(ledger: Arc<dyn Ledger>, store: HolderStore) -> Self {
        Self { ledger, store }
    }

    pub fn store(&self) -> &HolderStore {
        &self.store
    }

    /// Holder set for `options`, served from cache when fresh. With
    /// `use_cache` off the ledger is always queried and the entry refreshed.
    pub async fn collect(&self, options: &CollectOptions) -> Result<Vec<HolderRecord>> {
        options.validate()?;
        let key = options.cache_key();

        if options.use_cache {
            match self.store.get(&key) {
                Ok(Some(holders)) => {
                    debug!(asset = %options.asset, holders = holders.len(), "holder cache hit");
                    return Ok(holders);
                }
                Ok(None) => debug!(asset = %options.asset, "holder cache miss"),
                Err(e) => warn!(asset = %options.asset, error = %e, "holder cache read failed"),
            }
        }

        let fetched = self
            .ledger
            .holders_of(&options.asset, options.threshold)
            .await
            .map_err(|e| {
                DistributionError::network(format!("fetching holders of {}", options.asset), &e)
            })?;
        let fetched_count = fetched.len();
        let holders = apply_filters(fetched, options);

        info!(
            asset = %options.asset,
            fetched = fetched_count,
            kept = holders.len(),
            "collected holders"
        );

        if let Err(e) = self.store.put(&key, &holders, options.cache_ttl_seconds) {
            warn!(asset = %options.asset, error = %e, "failed to cache holder snapshot");
        }

        Ok(holders)
    }
}
