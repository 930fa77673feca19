//! Consensus configuration parameters.

/// Protocol-level and implementation-level consensus knobs.
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Target seconds between blocks. A candidate block must not land
    /// earlier than `0.8 * block_time_secs` after its parent.
    pub block_time_secs: u64,
    /// Soft limit on the number of transactions per block.
    pub max_block_txs: usize,
    /// Soft limit on the total serialized size of a block, in bytes.
    pub max_block_size_bytes: usize,
    /// How far into the future a block or transaction timestamp may be.
    pub timestamp_tolerance_secs: u64,
    /// Minimum stake required for an address to be eligible as a validator.
    pub min_validator_stake: u64,
    /// Fixed block reward paid to the proposer via the Coinbase transaction.
    pub block_reward: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_time_secs: 5,
            max_block_txs: 1_000,
            max_block_size_bytes: 1_000_000,
            timestamp_tolerance_secs: 3_600,
            min_validator_stake: 1_000,
            block_reward: 50,
        }
    }
}
