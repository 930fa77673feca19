//! Chain library crate.
//!
//! This crate provides the core building blocks for a permissionless
//! proof-of-stake ledger:
//!
//! - strongly-typed domain types (`types`),
//! - account/balance/stake bookkeeping (`state`),
//! - a modular consensus engine (`consensus`),
//! - a transaction mempool (`mempool`),
//! - storage backends (`storage`),
//! - wire framing and gossip (`network`, `gossip`),
//! - peer bookkeeping and chain sync (`peer`, `sync`),
//! - Prometheus-based metrics (`metrics`),
//! - node orchestration (`node`),
//! - and top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into a running validator;
//! see [`node::Node`].

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod gossip;
pub mod mempool;
pub mod metrics;
pub mod network;
pub mod node;
pub mod peer;
pub mod state;
pub mod storage;
pub mod sync;
pub mod types;

// Re-export top-level configuration types.
pub use config::{
    CheckpointConfig, GenesisAllocation, GenesisSpec, MetricsConfig, NetworkConfig, NodeConfig,
};

// Re-export "core" consensus types and traits.
pub use consensus::{
    AcceptAllValidator, BlockValidator, ChainStore, Checkpoint, CombinedValidator,
    ConsensusConfig, ConsensusEngine, ConsensusError, ForkChoice, Proposer, SemanticValidator,
    StakeWeightedForkChoice, StructuralValidator, TxPool,
};

// Re-export storage backends.
pub use storage::{InMemoryChainStore, RocksDbChainStore, RocksDbConfig, StorageError};

// Re-export account/state types.
pub use state::{Account, ChainState, StateError};

// Re-export the mempool.
pub use mempool::{Mempool, MempoolConfig, MempoolError};

// Re-export gossip and network plumbing.
pub use gossip::{Envelope, GossipConfig, GossipEngine, Payload, ReceiveOutcome};
pub use network::{FrameError, read_frame, write_frame};
pub use peer::{PeerRecord, PeerState, PeerStateError};
pub use sync::{SyncEngine, SyncError};

// Re-export metrics registry and node metrics.
pub use metrics::{MetricsRegistry, NodeMetrics, run_prometheus_http_server};

// Re-export node orchestration.
pub use node::{Node, NodeError};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default block validator stack used by a validator
/// node: structural checks first, then semantic/state-dependent checks.
pub type DefaultBlockValidator = CombinedValidator<StructuralValidator, SemanticValidator>;

/// Type alias for the default fork-choice rule.
pub type DefaultForkChoice = StakeWeightedForkChoice;

/// Type alias for the default chain store backend.
pub type DefaultChainStore = RocksDbChainStore;

/// Type alias for the default consensus engine stack:
///
/// - [`DefaultChainStore`] (RocksDB),
/// - [`DefaultBlockValidator`] (structural + semantic),
/// - [`DefaultForkChoice`] (stake-weighted).
pub type DefaultConsensusEngine =
    ConsensusEngine<DefaultChainStore, DefaultBlockValidator, DefaultForkChoice>;
