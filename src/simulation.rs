//! Dry-run of a distribution: plans the request and estimates cost, duration
//! and risk without touching the ledger.

use serde::Serialize;
use std::fmt;

use crate::config::{EngineConfig, RiskConfig, SimulationConfig};
use crate::error::Result;
use crate::planner::{self, AllocationMap};
use crate::types::DistributionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Breakdown {
    pub total: f64,
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl Breakdown {
    fn from_allocations(map: &AllocationMap) -> Self {
        let count = map.len();
        if count == 0 {
            return Self {
                total: 0.0,
                count: 0,
                average: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let min = map.iter().map(|a| a.amount).min().unwrap_or(0);
        let max = map.iter().map(|a| a.amount).max().unwrap_or(0);
        let total = map.total_ui();
        Self {
            total,
            count,
            average: total / count as f64,
            min: map.to_ui(min),
            max: map.to_ui(max),
        }
    }
}

/// Advisory warnings; none of them block execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskFactor {
    LargeAmount { amount: f64, threshold: f64 },
    ManyRecipients { count: usize, threshold: usize },
    /// Holders whose unrounded proportional share is below the threshold
    SmallAllocations { holders: usize, threshold: f64 },
    NoEligibleRecipients,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFactor::LargeAmount { amount, threshold } => {
                write!(f, "large distribution: {amount} exceeds {threshold}")
            }
            RiskFactor::ManyRecipients { count, threshold } => {
                write!(f, "{count} recipients exceeds {threshold}; expect a long run")
            }
            RiskFactor::SmallAllocations { holders, threshold } => {
                write!(f, "{holders} holders would receive less than {threshold}")
            }
            RiskFactor::NoEligibleRecipients => write!(f, "no holder is eligible"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Fees, in SOL
    pub estimated_cost: f64,
    pub estimated_duration_secs: f64,
    pub breakdown: Breakdown,
    pub risk_factors: Vec<RiskFactor>,
    pub allocations: AllocationMap,
}

pub struct Simulator {
    simulation: SimulationConfig,
    risk: RiskConfig,
}

impl Simulator {
    pub fn new(simulation: SimulationConfig, risk: RiskConfig) -> Self {
        Self { simulation, risk }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.simulation.clone(), config.risk.clone())
    }

    pub fn simulate(&self, request: &DistributionRequest) -> Result<SimulationReport> {
        request.validate()?;
        let decimals = request
            .decimals
            .unwrap_or(self.simulation.default_decimals);
        planner::checked_total_units(request.total_amount, decimals)?;

        let allocations = planner::plan(
            &request.holders,
            request.total_amount,
            request.policy,
            request.minimum_holder_balance,
            decimals,
        );

        let recipients = allocations.len();
        let batches = recipients.div_ceil(request.batch_size);
        let report = SimulationReport {
            estimated_cost: recipients as f64 * self.simulation.cost_per_transfer,
            estimated_duration_secs: batches as f64 * self.simulation.seconds_per_batch,
            breakdown: Breakdown::from_allocations(&allocations),
            risk_factors: self.assess(request, &allocations),
            allocations,
        };

        tracing::debug!(
            recipients,
            batches,
            risks = report.risk_factors.len(),
            "simulated distribution"
        );
        Ok(report)
    }

    fn assess(&self, request: &DistributionRequest, allocations: &AllocationMap) -> Vec<RiskFactor> {
        let mut risks = Vec::new();

        if allocations.is_empty() {
            risks.push(RiskFactor::NoEligibleRecipients);
        }
        if request.total_amount > self.risk.large_amount_threshold {
            risks.push(RiskFactor::LargeAmount {
                amount: request.total_amount,
                threshold: self.risk.large_amount_threshold,
            });
        }
        if allocations.len() > self.risk.large_recipient_threshold {
            risks.push(RiskFactor::ManyRecipients {
                count: allocations.len(),
                threshold: self.risk.large_recipient_threshold,
            });
        }

        let small = planner::raw_shares(
            &request.holders,
            request.total_amount,
            request.minimum_holder_balance,
        )
        .iter()
        .filter(|(_, share)| *share < self.risk.small_allocation_threshold)
        .count();
        if small > 0 {
            risks.push(RiskFactor::SmallAllocations {
                holders: small,
                threshold: self.risk.small_allocation_threshold,
            });
        }

        risks
    }
}
