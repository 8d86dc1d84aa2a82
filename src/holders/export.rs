//! Holder snapshot export: delimited rows and JSON. Both read back losslessly.

use anyhow::{anyhow, Context, Result};

use crate::types::{Address, HolderRecord};

const CSV_HEADER: &str = "address,balance,percentage";

pub fn holders_to_csv(holders: &[HolderRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + holders.len() * 80);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for h in holders {
        out.push_str(&format!("{},{},{}\n", h.address, h.balance, h.percentage));
    }
    out
}

pub fn holders_from_csv(csv: &str) -> Result<Vec<HolderRecord>> {
    let mut holders = Vec::new();
    for (lineno, line) in csv.lines().enumerate() {
        let t = line.trim();
        if t.is_empty() || (lineno == 0 && t.eq_ignore_ascii_case(CSV_HEADER)) {
            continue;
        }
        let parts: Vec<&str> = t.split(',').map(|s| s.trim()).collect();
        if parts.len() != 3 {
            return Err(anyhow!(
                "bad csv at line {}: expected 3 fields, got {}",
                lineno + 1,
                parts.len()
            ));
        }
        let address: Address = parts[0]
            .parse()
            .with_context(|| format!("bad address at line {}", lineno + 1))?;
        let balance: f64 = parts[1]
            .parse()
            .with_context(|| format!("bad balance at line {}", lineno + 1))?;
        let percentage: f64 = parts[2]
            .parse()
            .with_context(|| format!("bad percentage at line {}", lineno + 1))?;
        holders.push(HolderRecord::new(address, balance, percentage));
    }
    Ok(holders)
}

pub fn holders_to_json(holders: &[HolderRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(holders)?)
}

pub fn holders_from_json(json: &str) -> Result<Vec<HolderRecord>> {
    serde_json::from_str(json).context("parsing holder JSON")
}
