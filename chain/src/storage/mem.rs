//! In-memory chain store.
//!
//! Useful for unit tests, benchmarks, and small devnets. Blocks are kept
//! in a `HashMap` keyed by hash plus a height index; account state lives
//! in a single [`ChainState`].

use std::collections::HashMap;

use crate::consensus::store::{ChainStore, Checkpoint};
use crate::state::ChainState;
use crate::types::{Block, BlockHash};

/// In-memory implementation of [`ChainStore`].
#[derive(Default)]
pub struct InMemoryChainStore {
    blocks: HashMap<BlockHash, Block>,
    by_height: HashMap<u64, BlockHash>,
    tip: Option<BlockHash>,
    state: ChainState,
    checkpoint: Option<Checkpoint>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl ChainStore for InMemoryChainStore {
    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.blocks.get(hash).cloned()
    }

    fn get_block_by_height(&self, height: u64) -> Option<Block> {
        let hash = self.by_height.get(&height)?;
        self.blocks.get(hash).cloned()
    }

    fn put_block(&mut self, block: Block) {
        let hash = block.hash();
        self.by_height.insert(block.header.height, hash);
        self.blocks.insert(hash, block);
    }

    fn tip(&self) -> Option<BlockHash> {
        self.tip
    }

    fn set_tip(&mut self, hash: BlockHash) {
        self.tip = Some(hash);
    }

    fn state(&self) -> &ChainState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChainState {
        &mut self.state
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint
    }

    fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = Some(checkpoint);
    }
}
