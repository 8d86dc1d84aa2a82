//! Ledger boundary.
//!
//! The engine talks to the chain only through [`Ledger`]. `RpcLedger` is the
//! JSON-RPC implementation; tests script their own.

pub mod keypair;
pub mod ledger;
pub mod rpc;
pub mod token;
pub mod tx;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Address, HolderRecord};

pub use keypair::Keypair;
pub use ledger::RpcLedger;
pub use token::AssetProgram;

/// Raw token amount with its decimal precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub amount: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn ui_amount(&self) -> f64 {
        units_to_ui(self.amount, self.decimals)
    }
}

/// Minimal account metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Program that owns the account
    pub owner: Address,
    pub lamports: u64,
    pub data_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Operations the distribution engine needs from the chain.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Balance of `owner`'s associated account for `asset`, `None` if that
    /// account does not exist yet.
    async fn asset_balance(
        &self,
        owner: &Address,
        asset: &Address,
        program: AssetProgram,
    ) -> Result<Option<TokenAmount>>;

    async fn account_info(&self, address: &Address) -> Result<Option<AccountInfo>>;

    /// Every owner holding at least `min_balance` of `asset`
    async fn holders_of(&self, asset: &Address, min_balance: f64) -> Result<Vec<HolderRecord>>;

    /// Sign, submit and wait for confirmation. Returns the transaction id.
    async fn submit_transfer(&self, instructions: &[Instruction], signer: &Keypair)
        -> Result<String>;

    async fn asset_decimals(&self, asset: &Address) -> Result<u8>;
}

pub fn units_to_ui(units: u64, decimals: u8) -> f64 {
    units as f64 / 10f64.powi(decimals as i32)
}

/// Whole-token amount to minimal units, rounded to the nearest unit. `None`
/// when the result is negative, not finite, or does not fit in a u64.
pub fn ui_to_units(amount: f64, decimals: u8) -> Option<u64> {
    let scaled = (amount * 10f64.powi(decimals as i32)).round();
    // u64::MAX as f64 is 2^64, one past the largest representable value
    if scaled.is_finite() && scaled >= 0.0 && scaled < u64::MAX as f64 {
        Some(scaled as u64)
    } else {
        None
    }
}
