//! Legacy transaction wire format: message compilation and signing.
//!
//! Layout: `[sig count][signatures][header][keys][blockhash][instructions]`,
//! every array length encoded as compact-u16.

use anyhow::{anyhow, Result};

use super::{Instruction, Keypair};
use crate::types::Address;

pub fn encode_compact_u16(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

fn compact_len(len: usize, out: &mut Vec<u8>) -> Result<()> {
    let len = u16::try_from(len).map_err(|_| anyhow!("array too long for compact-u16: {len}"))?;
    encode_compact_u16(len, out);
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct KeyFlags {
    address: Address,
    signer: bool,
    writable: bool,
}

/// Order account keys: payer, writable signers, readonly signers,
/// writable non-signers, readonly non-signers.
fn ordered_keys(payer: &Address, instructions: &[Instruction]) -> Vec<KeyFlags> {
    let mut keys: Vec<KeyFlags> = vec![KeyFlags {
        address: *payer,
        signer: true,
        writable: true,
    }];

    let mut upsert = |address: Address, signer: bool, writable: bool| {
        if let Some(k) = keys.iter_mut().find(|k| k.address == address) {
            k.signer |= signer;
            k.writable |= writable;
        } else {
            keys.push(KeyFlags {
                address,
                signer,
                writable,
            });
        }
    };

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.address, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    let rank = |k: &KeyFlags| match (k.signer, k.writable) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    };
    // payer stays first; stable sort keeps first-seen order within a class
    let payer_entry = keys.remove(0);
    keys.sort_by_key(rank);
    keys.insert(0, payer_entry);
    keys
}

/// Serialize the message that gets signed.
pub fn compile_message(
    payer: &Address,
    instructions: &[Instruction],
    recent_blockhash: &[u8; 32],
) -> Result<Vec<u8>> {
    let keys = ordered_keys(payer, instructions);

    let num_signers = keys.iter().filter(|k| k.signer).count();
    let num_readonly_signed = keys.iter().filter(|k| k.signer && !k.writable).count();
    let num_readonly_unsigned = keys.iter().filter(|k| !k.signer && !k.writable).count();

    let mut out = Vec::with_capacity(256);
    out.push(u8::try_from(num_signers)?);
    out.push(u8::try_from(num_readonly_signed)?);
    out.push(u8::try_from(num_readonly_unsigned)?);

    compact_len(keys.len(), &mut out)?;
    for k in &keys {
        out.extend_from_slice(k.address.as_bytes());
    }
    out.extend_from_slice(recent_blockhash);

    let index_of = |address: &Address| -> Result<u8> {
        let idx = keys
            .iter()
            .position(|k| &k.address == address)
            .ok_or_else(|| anyhow!("account {address} missing from key list"))?;
        Ok(u8::try_from(idx)?)
    };

    compact_len(instructions.len(), &mut out)?;
    for ix in instructions {
        out.push(index_of(&ix.program_id)?);
        compact_len(ix.accounts.len(), &mut out)?;
        for meta in &ix.accounts {
            out.push(index_of(&meta.address)?);
        }
        compact_len(ix.data.len(), &mut out)?;
        out.extend_from_slice(&ix.data);
    }

    Ok(out)
}

/// Build a fully signed single-signer transaction. Returns `(signature, wire bytes)`.
pub fn sign_transaction(
    signer: &Keypair,
    instructions: &[Instruction],
    recent_blockhash: &[u8; 32],
) -> Result<([u8; 64], Vec<u8>)> {
    let payer = signer.address();
    let message = compile_message(&payer, instructions, recent_blockhash)?;
    if message[0] != 1 {
        return Err(anyhow!(
            "transaction requires {} signers, only the distributor can sign",
            message[0]
        ));
    }
    let signature = signer.sign(&message);

    let mut wire = Vec::with_capacity(1 + 64 + message.len());
    encode_compact_u16(1, &mut wire);
    wire.extend_from_slice(&signature);
    wire.extend_from_slice(&message);
    Ok((signature, wire))
}
