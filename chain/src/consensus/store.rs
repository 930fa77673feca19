//! Storage abstraction used by the consensus engine.

use crate::state::ChainState;
use crate::types::{Block, BlockHash};

/// A trusted checkpoint: a (height, hash) pair a node refuses to reorg
/// past, used by the sync engine to bound how far back a rival chain may
/// rewrite history.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub height: u64,
    pub hash: BlockHash,
}

/// Abstract storage interface used by the consensus engine.
///
/// Implementations can be backed by in-memory maps or RocksDB. The
/// interface covers everything consensus needs: block lookup by hash and
/// height, the current tip, the live account state, and an optional
/// finality checkpoint.
pub trait ChainStore {
    /// Fetches a block by hash, if present.
    fn get_block(&self, hash: &BlockHash) -> Option<Block>;

    /// Fetches the block at a given height on the canonical chain.
    fn get_block_by_height(&self, height: u64) -> Option<Block>;

    /// Persists a block, indexed by both hash and height.
    fn put_block(&mut self, block: Block);

    /// Returns the hash of the current tip of the canonical chain.
    fn tip(&self) -> Option<BlockHash>;

    /// Updates the current tip of the canonical chain.
    fn set_tip(&mut self, hash: BlockHash);

    /// Returns the height of the current tip, if any.
    fn height(&self) -> Option<u64> {
        self.tip()
            .and_then(|h| self.get_block(&h))
            .map(|b| b.header.height)
    }

    /// Read-only access to the account ledger at the current tip.
    fn state(&self) -> &ChainState;

    /// Sum of stake held by every account at the current tip, used by
    /// fork choice and validator eligibility checks.
    fn total_stake(&self) -> u64 {
        self.state().total_stake()
    }

    /// Mutable access to the account ledger, used when applying or
    /// undoing a block.
    fn state_mut(&mut self) -> &mut ChainState;

    /// The last trusted checkpoint, if one has been set.
    fn checkpoint(&self) -> Option<Checkpoint>;

    /// Records a new trusted checkpoint.
    fn set_checkpoint(&mut self, checkpoint: Checkpoint);
}
