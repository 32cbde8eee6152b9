//! `kydras-storage`: a multi-drive local storage pool that replicates each
//! file across N drives under rule-driven placement, with read-time
//! self-healing and whole-pool rebalancing.

pub mod config;
pub mod disk;
pub mod error;
pub mod glob;
pub mod hash;
pub mod index;
pub mod manager;
pub mod path_utils;
pub mod pool;
pub mod read;
pub mod rebalance;
pub mod rules;
pub mod scheduler;
pub mod write;

pub use config::EngineConfig;
pub use error::{Result, StorageError};
pub use manager::StorageEngine;
pub use pool::{PoolKind, StoragePool};
pub use rules::PoolRule;
