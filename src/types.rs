//! Core value types shared by the collector, planner, executor and history.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::DistributionError;

/// 32-byte account address, base58 in text form.
///
/// Parsing is the only validation point; a constructed `Address` is always
/// a well-formed key and is passed around by value afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl FromStr for Address {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DistributionError::validation("address is empty"));
        }
        let decoded = bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| DistributionError::validation(format!("invalid address {trimmed}: {e}")))?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| {
            DistributionError::validation(format!(
                "invalid address {trimmed}: decodes to {} bytes, expected 32",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One holder of the reference asset at collection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub address: Address,
    /// Balance in whole tokens (ui amount)
    pub balance: f64,
    /// Share of total supply, 0..=100
    pub percentage: f64,
}

impl HolderRecord {
    pub fn new(address: Address, balance: f64, percentage: f64) -> Self {
        Self {
            address,
            balance,
            percentage,
        }
    }
}

/// How the total amount is split across eligible holders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionPolicy {
    Equal,
    #[default]
    Proportional,
}

impl DistributionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionPolicy::Equal => "equal",
            DistributionPolicy::Proportional => "proportional",
        }
    }
}

impl fmt::Display for DistributionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionPolicy {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "proportional" => Ok(Self::Proportional),
            other => Err(DistributionError::validation(format!(
                "unknown distribution policy: {other}"
            ))),
        }
    }
}

pub const DEFAULT_BATCH_SIZE: usize = 10;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// A request to distribute `total_amount` of `asset` across `holders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRequest {
    pub total_amount: f64,
    pub asset: Address,
    pub holders: Vec<HolderRecord>,
    #[serde(default)]
    pub policy: DistributionPolicy,
    #[serde(default)]
    pub minimum_holder_balance: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Planning precision when no ledger is consulted (simulation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl DistributionRequest {
    pub fn new(total_amount: f64, asset: Address, holders: Vec<HolderRecord>) -> Self {
        Self {
            total_amount,
            asset,
            holders,
            policy: DistributionPolicy::default(),
            minimum_holder_balance: 0.0,
            batch_size: DEFAULT_BATCH_SIZE,
            decimals: None,
        }
    }

    pub fn with_policy(mut self, policy: DistributionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_minimum_holder_balance(mut self, minimum: f64) -> Self {
        self.minimum_holder_balance = minimum;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Reject malformed requests before any I/O happens.
    pub fn validate(&self) -> Result<(), DistributionError> {
        if !self.total_amount.is_finite() || self.total_amount <= 0.0 {
            return Err(DistributionError::validation(format!(
                "total amount must be positive, got {}",
                self.total_amount
            )));
        }
        if self.holders.is_empty() {
            return Err(DistributionError::validation("holder list is empty"));
        }
        if self.batch_size == 0 {
            return Err(DistributionError::validation("batch size must be positive"));
        }
        if !self.minimum_holder_balance.is_finite() || self.minimum_holder_balance < 0.0 {
            return Err(DistributionError::validation(format!(
                "minimum holder balance must be >= 0, got {}",
                self.minimum_holder_balance
            )));
        }
        if let Some(h) = self
            .holders
            .iter()
            .find(|h| !h.balance.is_finite() || h.balance < 0.0)
        {
            return Err(DistributionError::validation(format!(
                "holder {} has invalid balance {}",
                h.address, h.balance
            )));
        }
        Ok(())
    }
}
