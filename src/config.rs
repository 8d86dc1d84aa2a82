//! Engine Configuration
//!
//! Every component receives its parameters from an `EngineConfig` value at
//! construction. Values come from an optional TOML file, then `VISION_AIRDROP_*`
//! environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub fallback_urls: Vec<String>,
    pub timeout_ms: u64,
    /// Attempts for a single JSON-RPC call, across primary and fallbacks
    pub max_retries: u32,
    /// Signature status polls before a submitted transfer counts as failed
    pub confirm_attempts: u32,
    pub confirm_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            fallback_urls: Vec::new(),
            timeout_ms: 8000,
            max_retries: 3,
            confirm_attempts: 30,
            confirm_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("airdrop_data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub batch_size: usize,
    /// Pause between batches to stay under RPC rate limits
    pub batch_pause_ms: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::types::DEFAULT_BATCH_SIZE,
            batch_pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Estimated fee per transfer, in SOL
    pub cost_per_transfer: f64,
    pub seconds_per_batch: f64,
    pub default_decimals: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cost_per_transfer: 0.000005,
            seconds_per_batch: 2.0,
            default_decimals: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub large_amount_threshold: f64,
    pub large_recipient_threshold: usize,
    pub small_allocation_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            large_amount_threshold: 1_000_000.0,
            large_recipient_threshold: 1000,
            small_allocation_threshold: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub distribution: DistributionConfig,
    pub simulation: SimulationConfig,
    pub risk: RiskConfig,
    pub cache: CacheConfig,
    /// Solana keypair file (64-byte JSON array) of the distributing account
    pub keypair_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from a TOML file, or defaults when the file does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg: EngineConfig =
            toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }

    /// Apply `VISION_AIRDROP_*` environment overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = env::var("VISION_AIRDROP_RPC_URL") {
            if !url.trim().is_empty() {
                self.rpc.url = url.trim().to_string();
            }
        }

        // VISION_AIRDROP_RPC_FALLBACKS: comma separated
        if let Ok(val) = env::var("VISION_AIRDROP_RPC_FALLBACKS") {
            self.rpc.fallback_urls = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(dir) = env::var("VISION_AIRDROP_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = PathBuf::from(dir.trim());
            }
        }

        if let Ok(path) = env::var("VISION_AIRDROP_KEYPAIR") {
            if !path.trim().is_empty() {
                self.keypair_path = Some(PathBuf::from(path.trim()));
            }
        }

        if let Some(ms) = parse_env::<u64>("VISION_AIRDROP_BATCH_PAUSE_MS") {
            self.distribution.batch_pause_ms = ms;
        }

        if let Some(size) = parse_env::<usize>("VISION_AIRDROP_BATCH_SIZE") {
            self.distribution.batch_size = size;
        }

        if let Some(ttl) = parse_env::<u64>("VISION_AIRDROP_CACHE_TTL") {
            self.cache.ttl_seconds = ttl;
        }

        self
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
