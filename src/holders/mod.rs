//! Holder collection, caching and export.

pub mod collector;
pub mod export;
pub mod store;

pub use collector::{CollectOptions, WalletCollector};
pub use export::{holders_from_csv, holders_from_json, holders_to_csv, holders_to_json};
pub use store::HolderStore;
