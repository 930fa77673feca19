//! High-level consensus engine orchestration.
//!
//! The consensus engine wires together a [`ChainStore`] for persistence, a
//! [`BlockValidator`] for structural and semantic checks, a [`ForkChoice`]
//! rule, and a [`Proposer`] for block construction. It exposes methods to
//! propose new blocks (local leadership) and to import blocks received
//! from the network into the canonical chain, reorganizing account state
//! when a heavier fork overtakes the current tip.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ConsensusError;
use crate::consensus::fork_choice::ForkChoice;
use crate::consensus::proposer::{Proposer, TxPool};
use crate::consensus::store::ChainStore;
use crate::consensus::validator::BlockValidator;
use crate::crypto::Keypair;
use crate::state::ChainState;
use crate::types::{Block, BlockHash};

/// Fully-configurable consensus engine, generic over storage, validation,
/// and fork-choice strategy.
pub struct ConsensusEngine<S, V, F> {
    pub config: ConsensusConfig,
    store: S,
    validator: V,
    fork_choice: F,
    proposer: Proposer,
}

impl<S, V, F> ConsensusEngine<S, V, F>
where
    S: ChainStore,
    V: BlockValidator,
    F: ForkChoice,
{
    pub fn new(config: ConsensusConfig, store: S, validator: V, fork_choice: F) -> Self {
        let proposer = Proposer::from_config(&config);
        Self {
            config,
            store,
            validator,
            fork_choice,
            proposer,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn tip(&self) -> Option<BlockHash> {
        self.store.tip()
    }

    pub fn tip_block(&self) -> Option<Block> {
        self.tip().and_then(|h| self.store.get_block(&h))
    }

    /// Builds a new block on top of the current tip and imports it.
    pub fn propose_block<P>(
        &mut self,
        validator_kp: &Keypair,
        tx_pool: &mut P,
        timestamp: u64,
    ) -> Result<(BlockHash, Block), ConsensusError>
    where
        P: TxPool,
    {
        let block = self
            .proposer
            .build_block(&self.store, validator_kp, tx_pool, timestamp);
        let hash = self.import_block(block.clone())?;
        Ok((hash, block))
    }

    /// Validates and imports a block, used for both locally proposed
    /// blocks and blocks received over the network.
    ///
    /// Steps:
    /// 1. Look up the parent (required unless this is the genesis block).
    /// 2. Run structural and semantic validation against the live state.
    /// 3. Persist the block, indexed by hash.
    /// 4. Ask the fork-choice rule whether this block should become the
    ///    new tip; if so, recompute account state along the winning chain.
    pub fn import_block(&mut self, block: Block) -> Result<BlockHash, ConsensusError> {
        let new_hash = block.hash();
        let parent_hash = block.header.prev_hash;
        let parent = if block.header.height == 0 {
            None
        } else {
            let parent = self.store.get_block(&parent_hash);
            if parent.is_none() {
                return Err(ConsensusError::UnknownParent);
            }
            parent
        };

        self.validator
            .validate(&block, parent.as_ref(), parent_hash, self.store.state())?;

        self.store.put_block(block.clone());

        let current_tip = self.store.tip();
        let should_update_tip =
            self.fork_choice
                .should_update_tip(&self.store, current_tip, &block, new_hash);

        if should_update_tip {
            self.reorg_to(new_hash)?;
            self.store.set_tip(new_hash);
        }

        Ok(new_hash)
    }

    /// Recomputes account state for the chain ending at `new_tip` from
    /// genesis forward and installs it as the live state.
    ///
    /// This is the straightforward (if not most efficient) way to handle
    /// reorgs correctly: rather than threading per-block undo logs through
    /// the fork-choice decision, replay the winning chain's transactions
    /// from scratch. Chain depth is bounded in practice by the
    /// checkpoint distance the sync engine enforces.
    fn reorg_to(&mut self, new_tip: BlockHash) -> Result<(), ConsensusError> {
        let mut chain = Vec::new();
        let mut cursor = new_tip;
        loop {
            let block = self
                .store
                .get_block(&cursor)
                .ok_or(ConsensusError::UnknownParent)?;
            let height = block.header.height;
            let prev = block.header.prev_hash;
            chain.push(block);
            if height == 0 {
                break;
            }
            cursor = prev;
        }
        chain.reverse();

        let mut state = ChainState::new();
        for block in &chain {
            state.apply_block(block)?;
        }
        *self.store.state_mut() = state;
        Ok(())
    }
}
