//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - consensus parameters (`ConsensusConfig`),
//! - storage (RocksDB path and creation flags),
//! - the mempool (`MempoolConfig`),
//! - gossip (fanout, TTL, rate limiting),
//! - the metrics exporter (enable flag + listen address),
//! - and genesis allocation.
//!
//! The goal is to have a single `NodeConfig` struct that higher-level
//! binaries (e.g. `main.rs`) can construct from defaults, config files,
//! or environment variables as needed.

use std::net::SocketAddr;
use std::time::Duration;

use crate::consensus::ConsensusConfig;
use crate::gossip::GossipConfig;
use crate::mempool::MempoolConfig;
use crate::storage::RocksDbConfig;
use crate::types::Address;

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Network listener and peer-connection configuration.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Address this node listens for inbound peer connections on.
    pub listen_addr: SocketAddr,
    /// Peers to dial at startup.
    pub bootstrap_peers: Vec<SocketAddr>,
    /// Maximum number of blocks returned in a single sync batch.
    pub max_sync_batch: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let addr: SocketAddr = "0.0.0.0:7700"
            .parse()
            .expect("hard-coded listen address should parse");
        Self {
            listen_addr: addr,
            bootstrap_peers: Vec::new(),
            max_sync_batch: 500,
        }
    }
}

/// One account's starting balance and stake at genesis.
#[derive(Clone, Copy, Debug)]
pub struct GenesisAllocation {
    pub address: Address,
    pub balance: u64,
    pub stake: u64,
}

/// Genesis parameters: the initial account set a new chain starts from.
///
/// An empty allocation list is valid (an empty ledger), but then no
/// validator has stake and `select_validator` can never choose a
/// proposer, so in practice every deployed chain seeds at least one
/// staked account here.
#[derive(Clone, Debug, Default)]
pub struct GenesisSpec {
    pub allocations: Vec<GenesisAllocation>,
    pub timestamp: u64,
}

/// Checkpointing configuration: how often a node pins down a trusted
/// (height, hash) pair that bounds how far back a rival chain may reorg it.
#[derive(Clone, Copy, Debug)]
pub struct CheckpointConfig {
    /// Whether this node creates and advertises its own checkpoints.
    pub enabled: bool,
    /// Checkpoint every `every` blocks (a block height that is a multiple
    /// of this value becomes the new checkpoint once applied).
    pub every: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every: 1000,
        }
    }
}

/// Top-level configuration for a chain node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub storage: RocksDbConfig,
    pub mempool: MempoolConfig,
    pub gossip: GossipConfig,
    pub metrics: MetricsConfig,
    pub network: NetworkConfig,
    pub genesis: GenesisSpec,
    pub checkpoint: CheckpointConfig,
    /// How often the local node checks whether it is the selected
    /// validator and should attempt to propose a block.
    pub proposal_check_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            storage: RocksDbConfig::default(),
            mempool: MempoolConfig::default(),
            gossip: GossipConfig::default(),
            metrics: MetricsConfig::default(),
            network: NetworkConfig::default(),
            genesis: GenesisSpec::default(),
            checkpoint: CheckpointConfig::default(),
            proposal_check_interval: Duration::from_millis(500),
        }
    }
}
