//! Consensus engine and related abstractions.
//!
//! This module provides a modular, testable consensus layer consisting of:
//!
//! - configuration parameters ([`config::ConsensusConfig`]),
//! - the storage abstraction the engine persists through ([`store::ChainStore`]),
//! - deterministic validator selection ([`selection`]),
//! - pluggable block validity predicates ([`validator`]),
//! - a fork-choice rule ([`fork_choice`]),
//! - block assembly ([`proposer`]), and
//! - the engine itself ([`engine::ConsensusEngine`]), which ties the above
//!   together into propose/import operations.

pub mod config;
pub mod engine;
pub mod error;
pub mod fork_choice;
pub mod proposer;
pub mod selection;
pub mod store;
pub mod validator;

pub use config::ConsensusConfig;
pub use engine::ConsensusEngine;
pub use error::ConsensusError;
pub use fork_choice::{ForkChoice, StakeWeightedForkChoice};
pub use proposer::{Proposer, TxPool};
pub use store::{ChainStore, Checkpoint};
pub use validator::{AcceptAllValidator, BlockValidator, CombinedValidator, SemanticValidator, StructuralValidator};
