//! Distribution Planner
//!
//! Turns a holder list and a total into per-recipient amounts that sum to the
//! total exactly. Everything after the initial conversion to minimal units is
//! integer arithmetic, so the result does not depend on float rounding.

use serde::Serialize;

use crate::chain::{ui_to_units, units_to_ui};
use crate::error::{DistributionError, Result};
use crate::types::{Address, DistributionPolicy, HolderRecord};

/// Balances become integer weights at this scale before proportional splitting
const WEIGHT_SCALE: f64 = 1e9;

/// Upper bound for a single weight; larger balances use a smaller scale
const MAX_WEIGHT: f64 = (1u64 << 63) as f64;

/// Equal shares are floored to 1e-6 of a token
const EQUAL_SHARE_DECIMALS: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub recipient: Address,
    /// Minimal units of the asset
    pub amount: u64,
}

/// Ordered `recipient -> amount`. Never holds a zero amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationMap {
    decimals: u8,
    entries: Vec<Allocation>,
}

impl AllocationMap {
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals,
            entries: Vec::new(),
        }
    }

    /// Add `amount` for `recipient`; repeated recipients accumulate in place.
    fn credit(&mut self, recipient: Address, amount: u64) {
        if amount == 0 {
            return;
        }
        match self.entries.iter_mut().find(|a| a.recipient == recipient) {
            Some(existing) => existing.amount = existing.amount.saturating_add(amount),
            None => self.entries.push(Allocation { recipient, amount }),
        }
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn get(&self, recipient: &Address) -> Option<u64> {
        self.entries
            .iter()
            .find(|a| &a.recipient == recipient)
            .map(|a| a.amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_units(&self) -> u64 {
        self.entries.iter().map(|a| a.amount).sum()
    }

    pub fn to_ui(&self, units: u64) -> f64 {
        units_to_ui(units, self.decimals)
    }

    pub fn total_ui(&self) -> f64 {
        self.to_ui(self.total_units())
    }
}

fn eligible<'a>(holders: &'a [HolderRecord], minimum_holder_balance: f64) -> Vec<&'a HolderRecord> {
    holders
        .iter()
        .filter(|h| h.balance.is_finite() && h.balance > 0.0 && h.balance >= minimum_holder_balance)
        .collect()
}

/// `total_amount` in minimal units at `decimals`, rejecting totals a token
/// account cannot hold.
pub fn checked_total_units(total_amount: f64, decimals: u8) -> Result<u64> {
    ui_to_units(total_amount, decimals).ok_or_else(|| {
        DistributionError::validation(format!(
            "total {total_amount} exceeds representable units at {decimals} decimals"
        ))
    })
}

/// Plan a distribution of `total_amount` (whole tokens) at `decimals` precision.
///
/// Degenerate input (no eligible holder, non-positive total, or a total too
/// large for the asset's precision) yields an empty map.
pub fn plan(
    holders: &[HolderRecord],
    total_amount: f64,
    policy: DistributionPolicy,
    minimum_holder_balance: f64,
    decimals: u8,
) -> AllocationMap {
    let mut map = AllocationMap::new(decimals);
    if !total_amount.is_finite() || total_amount <= 0.0 {
        return map;
    }
    let Some(total_units) = ui_to_units(total_amount, decimals) else {
        return map;
    };
    let eligible = eligible(holders, minimum_holder_balance);
    if total_units == 0 || eligible.is_empty() {
        return map;
    }

    let amounts = match policy {
        DistributionPolicy::Equal => split_equal(total_units, eligible.len(), decimals),
        DistributionPolicy::Proportional => {
            let balances: Vec<f64> = eligible.iter().map(|h| h.balance).collect();
            split_proportional(total_units, &balances)
        }
    };

    for (holder, amount) in eligible.iter().zip(amounts) {
        map.credit(holder.address, amount);
    }
    map
}

/// Unrounded proportional share of each eligible holder, in whole tokens.
pub fn raw_shares(
    holders: &[HolderRecord],
    total_amount: f64,
    minimum_holder_balance: f64,
) -> Vec<(Address, f64)> {
    let eligible = eligible(holders, minimum_holder_balance);
    let total_balance: f64 = eligible.iter().map(|h| h.balance).sum();
    if total_balance <= 0.0 {
        return Vec::new();
    }
    eligible
        .iter()
        .map(|h| (h.address, total_amount * h.balance / total_balance))
        .collect()
}

/// Everyone but the last gets the floored equal share; the last absorbs the
/// remainder.
fn split_equal(total_units: u64, count: usize, decimals: u8) -> Vec<u64> {
    let step = 10u64
        .checked_pow(decimals.saturating_sub(EQUAL_SHARE_DECIMALS) as u32)
        .unwrap_or(u64::MAX);
    let base = total_units / count as u64;
    let share = base / step * step;

    let mut out = vec![share; count];
    out[count - 1] = total_units - share * (count as u64 - 1);
    out
}

/// Largest-remainder apportionment over integer weights.
fn split_proportional(total_units: u64, balances: &[f64]) -> Vec<u64> {
    let largest = balances.iter().fold(0.0f64, |m, b| m.max(*b));
    let scale = if largest * WEIGHT_SCALE > MAX_WEIGHT {
        MAX_WEIGHT / largest
    } else {
        WEIGHT_SCALE
    };
    let mut weights: Vec<u128> = balances
        .iter()
        .map(|b| (b.max(0.0) * scale).round().min(MAX_WEIGHT) as u128)
        .collect();
    let sum = |ws: &[u128]| ws.iter().try_fold(0u128, |acc, w| acc.checked_add(*w));

    let total = total_units as u128;
    // shrink weights until the exact sum exists and total * sum fits in u128
    let total_weight = loop {
        match sum(&weights) {
            Some(tw) if total.checked_mul(tw).is_some() => break tw,
            _ => weights.iter_mut().for_each(|w| *w >>= 1),
        }
    };
    if total_weight == 0 {
        return Vec::new();
    }

    let mut amounts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for w in &weights {
        let scaled = total * w;
        amounts.push((scaled / total_weight) as u64);
        remainders.push(scaled % total_weight);
    }

    // floors of an exact weight sum never exceed the total
    let allocated: u64 = amounts.iter().sum();
    let leftover = (total_units - allocated) as usize;

    // stable: equal remainders keep plan order
    let mut order: Vec<usize> = (0..amounts.len()).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]));
    for &i in order.iter().take(leftover) {
        amounts[i] += 1;
    }
    amounts
}
