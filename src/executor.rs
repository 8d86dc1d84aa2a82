//! Distribution Executor
//!
//! Plans a request against the asset's on-chain precision, checks the
//! distributor can fund it, then pays recipients one at a time in fixed-size
//! batches. A failed recipient is recorded and the run moves on; the run is
//! persisted at the end whatever the failure count.

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::chain::token::{self, AssetProgram};
use crate::chain::{units_to_ui, Keypair, Ledger};
use crate::config::DistributionConfig;
use crate::error::{DistributionError, Result};
use crate::history::{DistributionLedger, DistributionRun, TransferOutcome};
use crate::planner::{self, Allocation};
use crate::types::{Address, DistributionRequest};

/// Snapshot passed to the progress callback after every recipient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Recipients per second since the run started
    pub rate: f64,
}

/// Everything the per-recipient path needs, fixed for the whole run
#[derive(Debug, Clone, Copy)]
struct TransferContext {
    program: AssetProgram,
    asset: Address,
    decimals: u8,
    payer: Address,
}

pub struct DistributionExecutor {
    ledger: Arc<dyn Ledger>,
    signer: Arc<Keypair>,
    history: DistributionLedger,
    batch_pause: Duration,
    programs: Mutex<HashMap<Address, AssetProgram>>,
}

impl DistributionExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: Arc<Keypair>,
        history: DistributionLedger,
        config: &DistributionConfig,
    ) -> Self {
        Self {
            ledger,
            signer,
            history,
            batch_pause: Duration::from_millis(config.batch_pause_ms),
            programs: Mutex::new(HashMap::new()),
        }
    }

    pub fn distributor(&self) -> Address {
        self.signer.address()
    }

    pub async fn execute(&self, request: DistributionRequest) -> Result<DistributionRun> {
        self.execute_with_progress(request, |_| {}).await
    }

    pub async fn execute_with_progress<F>(
        &self,
        mut request: DistributionRequest,
        mut on_progress: F,
    ) -> Result<DistributionRun>
    where
        F: FnMut(&Progress),
    {
        request.validate()?;
        let asset = request.asset;

        let program = self.resolve_program(&asset).await?;
        let decimals = self
            .ledger
            .asset_decimals(&asset)
            .await
            .map_err(|e| DistributionError::network(format!("reading decimals of {asset}"), &e))?;
        planner::checked_total_units(request.total_amount, decimals)?;

        let allocations = planner::plan(
            &request.holders,
            request.total_amount,
            request.policy,
            request.minimum_holder_balance,
            decimals,
        );
        if allocations.is_empty() {
            return Err(DistributionError::validation(format!(
                "no eligible recipients among {} holders (minimum balance {})",
                request.holders.len(),
                request.minimum_holder_balance
            )));
        }

        let ctx = TransferContext {
            program,
            asset,
            decimals,
            payer: self.signer.address(),
        };
        self.preflight(&ctx, allocations.total_units()).await?;

        request.decimals = Some(decimals);
        let batch_size = request.batch_size;
        let mut run = DistributionRun::new(request);

        let entries: Vec<Allocation> = allocations.iter().copied().collect();
        let total = entries.len();
        let batch_count = total.div_ceil(batch_size);
        info!(
            run_id = %run.id,
            asset = %asset,
            program = program.as_str(),
            recipients = total,
            batches = batch_count,
            "starting distribution"
        );

        let started = Instant::now();
        let (mut completed, mut successful, mut failed) = (0usize, 0usize, 0usize);

        for (batch_idx, batch) in entries.chunks(batch_size).enumerate() {
            if batch_idx > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            debug!(run_id = %run.id, batch = batch_idx + 1, of = batch_count, size = batch.len(), "processing batch");

            for alloc in batch {
                if alloc.amount == 0 {
                    continue;
                }
                let pending =
                    TransferOutcome::pending(alloc.recipient, allocations.to_ui(alloc.amount), alloc.amount);

                let outcome = match self.transfer_one(&ctx, alloc).await {
                    Ok(signature) => {
                        successful += 1;
                        debug!(run_id = %run.id, recipient = %alloc.recipient, %signature, "transfer confirmed");
                        pending.confirmed(signature)
                    }
                    Err(e) => {
                        failed += 1;
                        let message = format!("{e:#}");
                        warn!(run_id = %run.id, recipient = %alloc.recipient, error = %message, "transfer failed");
                        pending.failed(message)
                    }
                };
                run.record(outcome);
                completed += 1;

                let elapsed = started.elapsed().as_secs_f64();
                on_progress(&Progress {
                    completed,
                    total,
                    successful,
                    failed,
                    rate: if elapsed > 0.0 {
                        completed as f64 / elapsed
                    } else {
                        completed as f64
                    },
                });
            }
        }

        if let Err(e) = self.history.save(&run) {
            warn!(run_id = %run.id, error = %e, "failed to persist distribution run");
        }

        info!(
            run_id = %run.id,
            successful,
            failed,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "distribution finished"
        );
        Ok(run)
    }

    /// Token program owning `asset`, looked up once per asset.
    async fn resolve_program(&self, asset: &Address) -> Result<AssetProgram> {
        let cached = self.programs.lock().get(asset).copied();
        if let Some(program) = cached {
            return Ok(program);
        }

        let context = format!("resolving token program of {asset}");
        let info = self
            .ledger
            .account_info(asset)
            .await
            .map_err(|e| DistributionError::network(&context, &e))?
            .ok_or_else(|| {
                DistributionError::network(&context, &anyhow!("asset account not found"))
            })?;
        let program = AssetProgram::from_owner(&info.owner).ok_or_else(|| {
            DistributionError::network(
                &context,
                &anyhow!("owner {} is not a token program", info.owner),
            )
        })?;

        debug!(asset = %asset, program = program.as_str(), "resolved asset program");
        self.programs.lock().insert(*asset, program);
        Ok(program)
    }

    /// Provision the distributor's asset account if missing, then require
    /// `required_units` of balance.
    async fn preflight(&self, ctx: &TransferContext, required_units: u64) -> Result<()> {
        let source = token::associated_account(&ctx.payer, &ctx.asset, ctx.program);
        let context = format!("checking distributor balance of {}", ctx.asset);

        let exists = self
            .ledger
            .account_info(&source)
            .await
            .map_err(|e| DistributionError::network(&context, &e))?
            .is_some();
        if !exists {
            info!(account = %source, "provisioning distributor asset account");
            let ix = token::create_associated_account_idempotent(
                &ctx.payer,
                &ctx.payer,
                &ctx.asset,
                ctx.program,
            );
            self.ledger
                .submit_transfer(&[ix], &self.signer)
                .await
                .map_err(|e| {
                    DistributionError::network("provisioning distributor asset account", &e)
                })?;
        }

        let available = self
            .ledger
            .asset_balance(&ctx.payer, &ctx.asset, ctx.program)
            .await
            .map_err(|e| DistributionError::network(&context, &e))?
            .map(|b| b.amount)
            .unwrap_or(0);

        if available < required_units {
            return Err(DistributionError::Resource {
                required: units_to_ui(required_units, ctx.decimals),
                available: units_to_ui(available, ctx.decimals),
            });
        }
        Ok(())
    }

    async fn transfer_one(&self, ctx: &TransferContext, alloc: &Allocation) -> anyhow::Result<String> {
        let destination = token::associated_account(&alloc.recipient, &ctx.asset, ctx.program);
        let needs_account = self
            .ledger
            .account_info(&destination)
            .await
            .with_context(|| format!("checking asset account of {}", alloc.recipient))?
            .is_none();

        let instructions = token::build_transfer(
            ctx.program,
            &ctx.payer,
            &ctx.asset,
            &alloc.recipient,
            alloc.amount,
            ctx.decimals,
            needs_account,
        );
        self.ledger
            .submit_transfer(&instructions, &self.signer)
            .await
            .with_context(|| format!("transfer to {}", alloc.recipient))
    }
}
