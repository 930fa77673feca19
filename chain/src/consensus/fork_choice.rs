//! Fork-choice rule for selecting the best chain.
//!
//! Ties are broken in a fully deterministic order so two honest nodes
//! never disagree on the canonical tip: higher cumulative stake wins;
//! ties on stake fall back to height, then to the lexicographically
//! smaller block hash.

use crate::consensus::store::ChainStore;
use crate::state::ChainState;
use crate::types::{Block, BlockHash};

/// A candidate chain's ranking weight, computed by walking from a tip back
/// to genesis (or to the fork point) and summing validator stake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainWeight {
    pub cumulative_stake: u128,
    pub height: u64,
    pub tip_hash: BlockHash,
}

impl Ord for ChainWeight {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cumulative_stake
            .cmp(&other.cumulative_stake)
            .then_with(|| self.height.cmp(&other.height))
            .then_with(|| other.tip_hash.as_bytes().cmp(self.tip_hash.as_bytes()))
    }
}

impl PartialOrd for ChainWeight {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Abstraction over fork-choice rules.
pub trait ForkChoice {
    /// Returns `true` if the candidate block should replace the current tip.
    fn should_update_tip(
        &self,
        store: &dyn ChainStore,
        current_tip: Option<BlockHash>,
        candidate: &Block,
        candidate_hash: BlockHash,
    ) -> bool;
}

/// Stake-weighted fork choice: the chain whose validators carried the
/// greatest cumulative stake along its length wins; height then hash break
/// ties.
#[derive(Clone, Copy, Debug, Default)]
pub struct StakeWeightedForkChoice;

impl StakeWeightedForkChoice {
    /// Walks from `tip_hash` back to genesis to recover the candidate
    /// chain, then replays it forward from an empty ledger, summing each
    /// block's validator's stake as it stood immediately before that block
    /// was applied. This is the actual stake backing each proposer, not a
    /// self-reported field on the block, so a validator cannot inflate its
    /// own chain weight by forging `header.reward`.
    fn weigh(store: &dyn ChainStore, tip_hash: BlockHash) -> Option<ChainWeight> {
        let mut chain = Vec::new();
        let mut cursor = tip_hash;
        loop {
            let block = store.get_block(&cursor)?;
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
        let mut cumulative_stake: u128 = 0;
        for block in &chain {
            cumulative_stake += state.get(&block.header.validator).stake as u128;
            state.apply_block(block).ok()?;
        }

        Some(ChainWeight {
            cumulative_stake,
            height: chain.last()?.header.height,
            tip_hash,
        })
    }
}

impl ForkChoice for StakeWeightedForkChoice {
    fn should_update_tip(
        &self,
        store: &dyn ChainStore,
        current_tip: Option<BlockHash>,
        candidate: &Block,
        candidate_hash: BlockHash,
    ) -> bool {
        let Some(candidate_weight) = Self::weigh(store, candidate_hash) else {
            return false;
        };
        let _ = candidate;

        match current_tip {
            None => true,
            Some(tip_hash) => match Self::weigh(store, tip_hash) {
                Some(tip_weight) => candidate_weight > tip_weight,
                None => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_weight_orders_by_stake_then_height_then_hash() {
        let a = ChainWeight {
            cumulative_stake: 100,
            height: 5,
            tip_hash: BlockHash::zero(),
        };
        let b = ChainWeight {
            cumulative_stake: 150,
            height: 3,
            tip_hash: BlockHash::zero(),
        };
        assert!(b > a);
    }

    #[test]
    fn fork_choice_is_zero_sized() {
        assert_eq!(core::mem::size_of::<StakeWeightedForkChoice>(), 0);
    }
}
