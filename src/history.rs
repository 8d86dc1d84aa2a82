//! Distribution History
//!
//! Runs, per-recipient transfer outcomes, and the append-only store that keeps
//! every run. One document per run under `distributions/distribution_<id>`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DistributionError;
use crate::storage::DocumentStore;
use crate::types::{Address, DistributionRequest};

const RUN_PREFIX: &str = "distributions/";

/// Transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Dequeued, not yet submitted or awaiting confirmation
    Pending,
    /// Confirmed on chain
    Confirmed,
    /// Submission or confirmation failed
    Failed,
}

/// Result of paying one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub recipient: Address,
    /// Whole tokens
    pub amount: f64,
    /// Minimal units actually transferred
    pub raw_amount: u64,
    pub status: TransferStatus,
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TransferOutcome {
    pub fn pending(recipient: Address, amount: f64, raw_amount: u64) -> Self {
        Self {
            recipient,
            amount,
            raw_amount,
            status: TransferStatus::Pending,
            transaction_id: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn confirmed(mut self, transaction_id: String) -> Self {
        self.status = TransferStatus::Confirmed;
        self.transaction_id = Some(transaction_id);
        self.timestamp = Utc::now();
        self
    }

    pub fn failed(mut self, error: String) -> Self {
        self.status = TransferStatus::Failed;
        self.error = Some(error);
        self.timestamp = Utc::now();
        self
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TransferStatus::Confirmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub recipients: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
    /// Whole tokens confirmed on chain
    pub confirmed_amount: f64,
}

/// One execution of a distribution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRun {
    pub id: String,
    pub request: DistributionRequest,
    pub results: Vec<TransferOutcome>,
    pub created_at: DateTime<Utc>,
}

impl DistributionRun {
    pub fn new(request: DistributionRequest) -> Self {
        Self::restore(Uuid::new_v4().to_string(), request, Utc::now())
    }

    /// Empty run with a known identity, for replaying stored outcomes.
    pub fn restore(id: String, request: DistributionRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            results: Vec::new(),
            created_at,
        }
    }

    pub fn record(&mut self, outcome: TransferOutcome) {
        self.results.push(outcome);
    }

    pub fn summary(&self) -> RunSummary {
        let count = |s: TransferStatus| self.results.iter().filter(|r| r.status == s).count();
        RunSummary {
            recipients: self.results.len(),
            successful: count(TransferStatus::Confirmed),
            failed: count(TransferStatus::Failed),
            pending: count(TransferStatus::Pending),
            confirmed_amount: self
                .results
                .iter()
                .filter(|r| r.is_confirmed())
                .map(|r| r.amount)
                .sum(),
        }
    }

    /// Recipients to retry in a follow-up run
    pub fn failed_recipients(&self) -> Vec<Address> {
        self.results
            .iter()
            .filter(|r| r.status == TransferStatus::Failed)
            .map(|r| r.recipient)
            .collect()
    }

    pub fn storage_key(&self) -> String {
        run_key(&self.id)
    }
}

fn run_key(id: &str) -> String {
    format!("{RUN_PREFIX}distribution_{id}")
}

/// Append-only history of distribution runs
#[derive(Clone)]
pub struct DistributionLedger {
    store: DocumentStore,
}

impl DistributionLedger {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn save(&self, run: &DistributionRun) -> Result<()> {
        self.store.write(&run.storage_key(), run)?;
        tracing::info!(
            run_id = %run.id,
            outcomes = run.results.len(),
            "📝 saved distribution run"
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> crate::error::Result<Option<DistributionRun>> {
        let stored = self
            .store
            .read::<DistributionRun>(&run_key(id))
            .map_err(|e| DistributionError::storage(&e))?;
        Ok(stored.map(replay))
    }

    /// Runs newest first. Documents that fail to decode are skipped.
    pub fn history(&self, limit: Option<usize>) -> crate::error::Result<Vec<DistributionRun>> {
        let records = self
            .store
            .scan_raw(RUN_PREFIX)
            .map_err(|e| DistributionError::storage(&e))?;
        let mut runs = Vec::new();
        for (path, bytes) in records {
            match serde_json::from_slice::<DistributionRun>(&bytes) {
                Ok(stored) => runs.push(replay(stored)),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping unreadable distribution record");
                }
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }
}

/// Rebuild a run by appending each stored outcome to a fresh run.
fn replay(stored: DistributionRun) -> DistributionRun {
    let mut run = DistributionRun::restore(stored.id, stored.request, stored.created_at);
    for outcome in stored.results {
        run.record(outcome);
    }
    run
}
