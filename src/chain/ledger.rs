//! `Ledger` over Solana JSON-RPC.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::rpc::RpcClient;
use super::token::{self, AssetProgram, TOKEN_ACCOUNT_LEN};
use super::tx;
use super::{AccountInfo, Instruction, Keypair, Ledger, TokenAmount};
use crate::config::RpcConfig;
use crate::types::{Address, HolderRecord};

const COMMITMENT: &str = "confirmed";

pub struct RpcLedger {
    client: RpcClient,
    confirm_attempts: u32,
    confirm_interval: Duration,
}

impl RpcLedger {
    pub fn new(cfg: &RpcConfig) -> Result<Self> {
        Ok(Self {
            client: RpcClient::from_config(cfg)?,
            confirm_attempts: cfg.confirm_attempts.max(1),
            confirm_interval: Duration::from_millis(cfg.confirm_interval_ms),
        })
    }

    async fn asset_program(&self, asset: &Address) -> Result<AssetProgram> {
        let info = self
            .account_info(asset)
            .await?
            .ok_or_else(|| anyhow!("asset account {asset} not found"))?;
        AssetProgram::from_owner(&info.owner)
            .ok_or_else(|| anyhow!("asset {asset} is owned by {}, not a token program", info.owner))
    }

    /// `(ui supply, decimals)`
    async fn token_supply(&self, asset: &Address) -> Result<(f64, u8)> {
        let result = self
            .client
            .call("getTokenSupply", json!([asset.to_string()]))
            .await?;
        let value = &result["value"];
        let decimals = value["decimals"]
            .as_u64()
            .ok_or_else(|| anyhow!("getTokenSupply: missing decimals"))?;
        let amount = parse_raw_amount(&value["amount"])?;
        let decimals = u8::try_from(decimals)?;
        Ok((super::units_to_ui(amount, decimals), decimals))
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32]> {
        let result = self
            .client
            .call("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await?;
        let hash = result["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| anyhow!("getLatestBlockhash: missing blockhash"))?;
        let bytes = bs58::decode(hash).into_vec()?;
        bytes
            .try_into()
            .map_err(|_| anyhow!("getLatestBlockhash: blockhash is not 32 bytes"))
    }

    async fn await_confirmation(&self, signature: &str) -> Result<()> {
        for attempt in 0..self.confirm_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.confirm_interval).await;
            }
            let result = self
                .client
                .call("getSignatureStatuses", json!([[signature]]))
                .await?;
            let status = &result["value"][0];
            if status.is_null() {
                continue;
            }
            if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
                return Err(anyhow!("transaction {signature} failed: {err}"));
            }
            match status["confirmationStatus"].as_str() {
                Some("confirmed") | Some("finalized") => return Ok(()),
                _ => continue,
            }
        }
        Err(anyhow!(
            "transaction {signature} not confirmed after {} checks",
            self.confirm_attempts
        ))
    }
}

fn parse_raw_amount(v: &Value) -> Result<u64> {
    v.as_str()
        .ok_or_else(|| anyhow!("token amount is not a string"))?
        .parse::<u64>()
        .context("token amount is not an integer")
}

/// Sum parsed token accounts per owner: `owner -> (raw amount, decimals)`.
fn aggregate_by_owner(accounts: &[Value]) -> Result<Vec<(Address, u64, u8)>> {
    let mut order: Vec<Address> = Vec::new();
    let mut totals: HashMap<Address, (u64, u8)> = HashMap::new();

    for acct in accounts {
        let info = &acct["account"]["data"]["parsed"]["info"];
        let owner: Address = info["owner"]
            .as_str()
            .ok_or_else(|| anyhow!("token account without owner"))?
            .parse()?;
        let amount = parse_raw_amount(&info["tokenAmount"]["amount"])?;
        let decimals = info["tokenAmount"]["decimals"].as_u64().unwrap_or(0);
        let entry = totals.entry(owner).or_insert_with(|| {
            order.push(owner);
            (0, decimals as u8)
        });
        entry.0 = entry.0.saturating_add(amount);
    }

    Ok(order
        .into_iter()
        .filter_map(|o| totals.get(&o).map(|(amt, dec)| (o, *amt, *dec)))
        .collect())
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn asset_balance(
        &self,
        owner: &Address,
        asset: &Address,
        program: AssetProgram,
    ) -> Result<Option<TokenAmount>> {
        let account = token::associated_account(owner, asset, program);
        if self.account_info(&account).await?.is_none() {
            return Ok(None);
        }
        let result = self
            .client
            .call("getTokenAccountBalance", json!([account.to_string()]))
            .await?;
        let value = &result["value"];
        let decimals = value["decimals"]
            .as_u64()
            .ok_or_else(|| anyhow!("getTokenAccountBalance: missing decimals"))?;
        Ok(Some(TokenAmount {
            amount: parse_raw_amount(&value["amount"])?,
            decimals: u8::try_from(decimals)?,
        }))
    }

    async fn account_info(&self, address: &Address) -> Result<Option<AccountInfo>> {
        let result = self
            .client
            .call(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": COMMITMENT }]),
            )
            .await?;
        let value = &result["value"];
        if value.is_null() {
            return Ok(None);
        }
        let owner: Address = value["owner"]
            .as_str()
            .ok_or_else(|| anyhow!("getAccountInfo: missing owner"))?
            .parse()?;
        let data_len = value["data"][0]
            .as_str()
            .map(|b64| {
                base64::engine::general_purpose::STANDARD
                    .decode(b64)
                    .map(|d| d.len())
            })
            .transpose()?
            .unwrap_or(0);
        Ok(Some(AccountInfo {
            owner,
            lamports: value["lamports"].as_u64().unwrap_or(0),
            data_len,
        }))
    }

    async fn holders_of(&self, asset: &Address, min_balance: f64) -> Result<Vec<HolderRecord>> {
        let program = self.asset_program(asset).await?;
        let (supply, _) = self.token_supply(asset).await?;

        let mut filters = vec![json!({ "memcmp": { "offset": 0, "bytes": asset.to_string() } })];
        if program == AssetProgram::Legacy {
            filters.push(json!({ "dataSize": TOKEN_ACCOUNT_LEN }));
        }

        let result = self
            .client
            .call(
                "getProgramAccounts",
                json!([
                    program.program_id().to_string(),
                    { "encoding": "jsonParsed", "commitment": COMMITMENT, "filters": filters }
                ]),
            )
            .await?;
        let accounts = result
            .as_array()
            .ok_or_else(|| anyhow!("getProgramAccounts: expected an array"))?;

        let holders = aggregate_by_owner(accounts)?
            .into_iter()
            .map(|(owner, raw, decimals)| {
                let balance = super::units_to_ui(raw, decimals);
                let percentage = if supply > 0.0 {
                    balance / supply * 100.0
                } else {
                    0.0
                };
                HolderRecord::new(owner, balance, percentage)
            })
            .filter(|h| h.balance > 0.0 && h.balance >= min_balance)
            .collect::<Vec<_>>();

        tracing::debug!(
            asset = %asset,
            program = program.as_str(),
            accounts = accounts.len(),
            holders = holders.len(),
            "fetched holder set"
        );
        Ok(holders)
    }

    async fn submit_transfer(&self, instructions: &[Instruction], signer: &Keypair) -> Result<String> {
        let blockhash = self.latest_blockhash().await?;
        let (signature, wire) = tx::sign_transaction(signer, instructions, &blockhash)?;
        let signature = bs58::encode(signature).into_string();

        let encoded = base64::engine::general_purpose::STANDARD.encode(&wire);
        let sent = self
            .client
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": "base64", "preflightCommitment": COMMITMENT }]),
            )
            .await?;
        if let Some(returned) = sent.as_str() {
            if returned != signature {
                tracing::warn!(expected = %signature, returned, "RPC returned unexpected signature");
            }
        }

        self.await_confirmation(&signature).await?;
        Ok(signature)
    }

    async fn asset_decimals(&self, asset: &Address) -> Result<u8> {
        Ok(self.token_supply(asset).await?.1)
    }
}
