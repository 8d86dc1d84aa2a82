//! SPL token program ids, associated account derivation and the two
//! instructions a distribution needs.

use curve25519_dalek::edwards::CompressedEdwardsY;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{AccountMeta, Instruction};
use crate::types::Address;

fn program_id(s: &str) -> Address {
    s.parse().expect("hard-coded program id is valid base58")
}

pub static TOKEN_PROGRAM_ID: Lazy<Address> =
    Lazy::new(|| program_id("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));
pub static TOKEN_2022_PROGRAM_ID: Lazy<Address> =
    Lazy::new(|| program_id("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"));
pub static ASSOCIATED_TOKEN_PROGRAM_ID: Lazy<Address> =
    Lazy::new(|| program_id("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"));
pub static SYSTEM_PROGRAM_ID: Lazy<Address> = Lazy::new(|| Address::new([0u8; 32]));

/// Size of a legacy token account; Token-2022 accounts may carry extensions.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const IX_TRANSFER_CHECKED: u8 = 12;
const IX_CREATE_IDEMPOTENT: u8 = 1;

/// Which token program owns an asset. Resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetProgram {
    /// Original SPL Token program
    Legacy,
    /// Token-2022, metadata/extension aware
    Extended,
}

impl AssetProgram {
    pub fn from_owner(owner: &Address) -> Option<Self> {
        if owner == &*TOKEN_PROGRAM_ID {
            Some(Self::Legacy)
        } else if owner == &*TOKEN_2022_PROGRAM_ID {
            Some(Self::Extended)
        } else {
            None
        }
    }

    pub fn program_id(&self) -> Address {
        match self {
            AssetProgram::Legacy => *TOKEN_PROGRAM_ID,
            AssetProgram::Extended => *TOKEN_2022_PROGRAM_ID,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetProgram::Legacy => "spl-token",
            AssetProgram::Extended => "token-2022",
        }
    }
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Find the off-curve program address for `seeds`, searching bumps from 255 down.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Address) -> Option<(Address, u8)> {
    for bump in (0..=u8::MAX).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let hash: [u8; 32] = hasher.finalize().into();
        if !is_on_curve(&hash) {
            return Some((Address::new(hash), bump));
        }
    }
    None
}

/// Associated token account of `owner` for `mint` under `program`.
pub fn associated_account(owner: &Address, mint: &Address, program: AssetProgram) -> Address {
    let token_program = program.program_id();
    find_program_address(
        &[
            owner.as_bytes(),
            token_program.as_bytes(),
            mint.as_bytes(),
        ],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(addr, _)| addr)
    .expect("no viable bump seed for associated account")
}

/// Create `owner`'s associated account unless it already exists.
pub fn create_associated_account_idempotent(
    payer: &Address,
    owner: &Address,
    mint: &Address,
    program: AssetProgram,
) -> Instruction {
    let account = associated_account(owner, mint, program);
    Instruction {
        program_id: *ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*payer, true),
            AccountMeta::writable(account, false),
            AccountMeta::readonly(*owner, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::readonly(*SYSTEM_PROGRAM_ID, false),
            AccountMeta::readonly(program.program_id(), false),
        ],
        data: vec![IX_CREATE_IDEMPOTENT],
    }
}

/// `TransferChecked` of `amount` minimal units between token accounts.
pub fn transfer_checked(
    program: AssetProgram,
    source: &Address,
    mint: &Address,
    destination: &Address,
    authority: &Address,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(10);
    data.push(IX_TRANSFER_CHECKED);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);

    Instruction {
        program_id: program.program_id(),
        accounts: vec![
            AccountMeta::writable(*source, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*authority, true),
        ],
        data,
    }
}

/// Decode a `transfer_checked` instruction back into `(destination, amount)`.
pub fn parse_transfer_checked(ix: &Instruction) -> Option<(Address, u64)> {
    if ix.data.len() != 10 || ix.data[0] != IX_TRANSFER_CHECKED || ix.accounts.len() != 4 {
        return None;
    }
    let amount = u64::from_le_bytes(ix.data[1..9].try_into().ok()?);
    Some((ix.accounts[2].address, amount))
}

/// Instructions paying `amount` to `recipient`, provisioning its account first
/// when `needs_account` is set.
#[allow(clippy::too_many_arguments)]
pub fn build_transfer(
    program: AssetProgram,
    payer: &Address,
    mint: &Address,
    recipient: &Address,
    amount: u64,
    decimals: u8,
    needs_account: bool,
) -> Vec<Instruction> {
    let source = associated_account(payer, mint, program);
    let destination = associated_account(recipient, mint, program);
    let mut ixs = Vec::with_capacity(2);
    if needs_account {
        ixs.push(create_associated_account_idempotent(
            payer, recipient, mint, program,
        ));
    }
    ixs.push(transfer_checked(
        program,
        &source,
        mint,
        &destination,
        payer,
        amount,
        decimals,
    ));
    ixs
}
