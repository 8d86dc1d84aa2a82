#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::Level;

use vision_airdrop::chain::token::{self, AssetProgram, ASSOCIATED_TOKEN_PROGRAM_ID};
use vision_airdrop::chain::{AccountInfo, Instruction, Keypair, Ledger, TokenAmount};
use vision_airdrop::types::{Address, HolderRecord};

pub fn init_test_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_test_writer()
            .try_init();
    });
}

pub fn addr(tag: u8) -> Address {
    Address::new([tag; 32])
}

pub fn holder(tag: u8, balance: f64) -> HolderRecord {
    HolderRecord::new(addr(tag), balance, 0.0)
}

pub fn signer() -> Keypair {
    Keypair::from_secret_bytes(&[7u8; 32])
}

const MINT_LEN: usize = 82;
const MINT_RENT: u64 = 1_461_600;
const TOKEN_ACCOUNT_RENT: u64 = 2_039_280;

#[derive(Default)]
struct MockState {
    accounts: HashMap<Address, AccountInfo>,
    /// Raw balances keyed by associated account
    balances: HashMap<Address, u64>,
    decimals: HashMap<Address, u8>,
    holders: HashMap<Address, Vec<HolderRecord>>,
    holder_queries: usize,
    /// Destination associated accounts whose transfers are rejected
    failing: HashSet<Address>,
    submissions: Vec<Vec<Instruction>>,
}

/// In-memory chain: token accounts, balances and a scripted holder set.
/// Submissions apply atomically, and a transfer to a missing account fails
/// the way a real token program would.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&self, mint: Address, program: AssetProgram, decimals: u8) {
        let mut s = self.state.lock();
        s.accounts.insert(
            mint,
            AccountInfo {
                owner: program.program_id(),
                lamports: MINT_RENT,
                data_len: MINT_LEN,
            },
        );
        s.decimals.insert(mint, decimals);
    }

    pub fn set_holders(&self, mint: Address, holders: Vec<HolderRecord>) {
        self.state.lock().holders.insert(mint, holders);
    }

    /// Create `owner`'s associated account for `mint` holding `units`.
    pub fn fund(&self, owner: &Address, mint: &Address, program: AssetProgram, units: u64) {
        let account = token::associated_account(owner, mint, program);
        let mut s = self.state.lock();
        s.accounts.insert(account, token_account(program));
        s.balances.insert(account, units);
    }

    pub fn fail_transfers_to(&self, recipient: &Address, mint: &Address, program: AssetProgram) {
        let account = token::associated_account(recipient, mint, program);
        self.state.lock().failing.insert(account);
    }

    pub fn balance_of(&self, owner: &Address, mint: &Address, program: AssetProgram) -> u64 {
        let account = token::associated_account(owner, mint, program);
        self.state.lock().balances.get(&account).copied().unwrap_or(0)
    }

    pub fn has_account(&self, owner: &Address, mint: &Address, program: AssetProgram) -> bool {
        let account = token::associated_account(owner, mint, program);
        self.state.lock().accounts.contains_key(&account)
    }

    pub fn holder_queries(&self) -> usize {
        self.state.lock().holder_queries
    }

    pub fn submissions(&self) -> Vec<Vec<Instruction>> {
        self.state.lock().submissions.clone()
    }
}

fn token_account(program: AssetProgram) -> AccountInfo {
    AccountInfo {
        owner: program.program_id(),
        lamports: TOKEN_ACCOUNT_RENT,
        data_len: token::TOKEN_ACCOUNT_LEN,
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn asset_balance(
        &self,
        owner: &Address,
        asset: &Address,
        program: AssetProgram,
    ) -> Result<Option<TokenAmount>> {
        let account = token::associated_account(owner, asset, program);
        let s = self.state.lock();
        if !s.accounts.contains_key(&account) {
            return Ok(None);
        }
        let decimals = s.decimals.get(asset).copied().unwrap_or(0);
        Ok(Some(TokenAmount {
            amount: s.balances.get(&account).copied().unwrap_or(0),
            decimals,
        }))
    }

    async fn account_info(&self, address: &Address) -> Result<Option<AccountInfo>> {
        Ok(self.state.lock().accounts.get(address).cloned())
    }

    async fn holders_of(&self, asset: &Address, min_balance: f64) -> Result<Vec<HolderRecord>> {
        let mut s = self.state.lock();
        s.holder_queries += 1;
        let holders = s
            .holders
            .get(asset)
            .ok_or_else(|| anyhow!("no holders scripted for {asset}"))?;
        Ok(holders
            .iter()
            .filter(|h| h.balance > 0.0 && h.balance >= min_balance)
            .cloned()
            .collect())
    }

    async fn submit_transfer(&self, instructions: &[Instruction], _signer: &Keypair) -> Result<String> {
        let mut s = self.state.lock();
        s.submissions.push(instructions.to_vec());
        let signature = format!("mocksig{}", s.submissions.len());

        // validate everything before applying anything
        let mut created = HashSet::new();
        let mut moves = Vec::new();
        for ix in instructions {
            if ix.program_id == *ASSOCIATED_TOKEN_PROGRAM_ID {
                let account = ix
                    .accounts
                    .get(1)
                    .ok_or_else(|| anyhow!("malformed create instruction"))?
                    .address;
                created.insert((account, ix.accounts[5].address));
                continue;
            }
            let (destination, amount) = token::parse_transfer_checked(ix)
                .ok_or_else(|| anyhow!("unsupported instruction"))?;
            let source = ix.accounts[0].address;
            if s.failing.contains(&destination) {
                bail!("Transaction simulation failed: custom program error 0x1");
            }
            let exists = s.accounts.contains_key(&destination)
                || created.iter().any(|(a, _)| *a == destination);
            if !exists {
                bail!("invalid account data for instruction: destination missing");
            }
            let available = s.balances.get(&source).copied().unwrap_or(0);
            if available < amount {
                bail!("insufficient funds: {available} < {amount}");
            }
            moves.push((source, destination, amount));
        }

        for (account, program_id) in created {
            let program = AssetProgram::from_owner(&program_id)
                .ok_or_else(|| anyhow!("unknown token program {program_id}"))?;
            s.accounts.entry(account).or_insert_with(|| token_account(program));
        }
        for (source, destination, amount) in moves {
            *s.balances.entry(source).or_insert(0) -= amount;
            *s.balances.entry(destination).or_insert(0) += amount;
        }
        Ok(signature)
    }

    async fn asset_decimals(&self, asset: &Address) -> Result<u8> {
        self.state
            .lock()
            .decimals
            .get(asset)
            .copied()
            .ok_or_else(|| anyhow!("unknown asset {asset}"))
    }
}
