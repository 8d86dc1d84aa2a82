// ---- Clippy/lints: keep signals high, noise low ----
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Token distribution engine: collect the holders of an asset, plan an exact
//! split of a fixed amount across them, simulate it, and execute it as
//! batched on-chain transfers with a persistent run history.

pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod holders;
pub mod planner;
pub mod simulation;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use error::{DistributionError, Result};
pub use executor::{DistributionExecutor, Progress};
pub use history::{DistributionLedger, DistributionRun, TransferOutcome, TransferStatus};
pub use holders::{CollectOptions, HolderStore, WalletCollector};
pub use planner::{plan, Allocation, AllocationMap};
pub use simulation::{RiskFactor, SimulationReport, Simulator};
pub use types::{Address, DistributionPolicy, DistributionRequest, HolderRecord};
