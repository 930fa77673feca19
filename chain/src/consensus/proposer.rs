//! Block proposal logic.
//!
//! The proposer assembles a candidate block on top of the current tip: it
//! pulls a batch of transactions from the mempool, prepends a Coinbase
//! transaction paying the block reward (plus collected fees) to the
//! validator, computes the Merkle root, and signs the header.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::store::ChainStore;
use crate::crypto::Keypair;
use crate::types::block::merkle_root;
use crate::types::{Block, BlockHash, Hash256, Header, Transaction};

/// Abstract transaction pool interface consumed by the proposer.
///
/// Consensus does not care how transactions are stored or gossiped; it
/// only needs a way to ask for a batch that fits into a block.
pub trait TxPool {
    /// Selects a batch of transactions for inclusion in a block, removing
    /// them from the pool. Implementations should respect `max_txs` and
    /// `max_bytes` as soft limits.
    fn select_for_block(&mut self, max_txs: usize, max_bytes: usize) -> Vec<Transaction>;
}

/// Configurable block proposer.
#[derive(Clone, Debug)]
pub struct Proposer {
    pub max_block_txs: usize,
    pub max_block_size_bytes: usize,
    pub block_reward: u64,
}

impl Proposer {
    pub fn from_config(cfg: &ConsensusConfig) -> Self {
        Self {
            max_block_txs: cfg.max_block_txs,
            max_block_size_bytes: cfg.max_block_size_bytes,
            block_reward: cfg.block_reward,
        }
    }

    /// Builds a new, signed block on top of the current tip.
    ///
    /// This does not perform validation or persistence; callers should
    /// pass the resulting block into [`crate::consensus::engine::ConsensusEngine::import_block`].
    pub fn build_block<S, P>(
        &self,
        store: &S,
        validator: &Keypair,
        tx_pool: &mut P,
        timestamp: u64,
    ) -> Block
    where
        S: ChainStore,
        P: TxPool,
    {
        let (prev_hash, next_height) = match store.tip() {
            Some(tip_hash) => match store.get_block(&tip_hash) {
                Some(tip_block) => (tip_hash, tip_block.header.height + 1),
                None => (BlockHash::zero(), 0),
            },
            None => (BlockHash::zero(), 0),
        };

        // Leave room for the Coinbase transaction prepended below.
        let budget = self.max_block_txs.saturating_sub(1);
        let txs = tx_pool.select_for_block(budget, self.max_block_size_bytes);
        let fees: u64 = txs.iter().map(|tx| tx.fee).sum();
        let reward = self.block_reward.saturating_add(fees);

        let coinbase = Transaction::coinbase(validator.address(), reward, timestamp);
        let mut all_txs = Vec::with_capacity(txs.len() + 1);
        all_txs.push(coinbase);
        all_txs.extend(txs);

        let hashes: Vec<Hash256> = all_txs.iter().map(Transaction::hash).collect();
        let header = Header {
            height: next_height,
            timestamp,
            prev_hash,
            merkle_root: merkle_root(&hashes),
            validator: validator.address(),
            validator_pubkey: validator.public_key(),
            reward,
        };

        let mut block = Block {
            header,
            signature: crate::types::Signature(Vec::new()),
            txs: all_txs,
        };
        block.sign(validator);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::store::Checkpoint;
    use crate::state::ChainState;
    use std::collections::HashMap;

    struct TestStore {
        blocks: HashMap<BlockHash, Block>,
        tip: Option<BlockHash>,
        state: ChainState,
    }

    impl TestStore {
        fn new() -> Self {
            Self {
                blocks: HashMap::new(),
                tip: None,
                state: ChainState::new(),
            }
        }
    }

    impl ChainStore for TestStore {
        fn get_block(&self, hash: &BlockHash) -> Option<Block> {
            self.blocks.get(hash).cloned()
        }
        fn get_block_by_height(&self, height: u64) -> Option<Block> {
            self.blocks.values().find(|b| b.header.height == height).cloned()
        }
        fn put_block(&mut self, block: Block) {
            self.blocks.insert(block.hash(), block);
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
            None
        }
        fn set_checkpoint(&mut self, _checkpoint: Checkpoint) {}
    }

    struct EmptyPool;
    impl TxPool for EmptyPool {
        fn select_for_block(&mut self, _max_txs: usize, _max_bytes: usize) -> Vec<Transaction> {
            Vec::new()
        }
    }

    #[test]
    fn genesis_block_has_height_zero_and_zero_parent() {
        let cfg = ConsensusConfig::default();
        let proposer = Proposer::from_config(&cfg);
        let store = TestStore::new();
        let kp = crate::crypto::Keypair::generate();
        let mut pool = EmptyPool;

        let block = proposer.build_block(&store, &kp, &mut pool, 1_700_000_000);

        assert_eq!(block.header.height, 0);
        assert_eq!(block.header.prev_hash.as_bytes(), BlockHash::zero().as_bytes());
        assert_eq!(block.txs.len(), 1);
        assert!(block.verify_structure(cfg.max_block_txs, cfg.block_reward).is_ok());
    }

    #[test]
    fn coinbase_reward_includes_collected_fees() {
        struct OneFeeTx(bool);
        impl TxPool for OneFeeTx {
            fn select_for_block(&mut self, _max_txs: usize, _max_bytes: usize) -> Vec<Transaction> {
                if self.0 {
                    self.0 = false;
                    let kp = crate::crypto::Keypair::generate();
                    let recipient = crate::crypto::Keypair::generate().address();
                    let mut tx = Transaction {
                        sender: kp.address(),
                        recipient,
                        amount: 10,
                        fee: 5,
                        nonce: 0,
                        kind: crate::types::TransactionKind::Transfer,
                        data: Vec::new(),
                        timestamp: 1_700_000_000,
                        public_key: crate::types::PublicKey(Vec::new()),
                        signature: crate::types::Signature(Vec::new()),
                    };
                    tx.sign(&kp);
                    vec![tx]
                } else {
                    Vec::new()
                }
            }
        }

        let cfg = ConsensusConfig::default();
        let proposer = Proposer::from_config(&cfg);
        let store = TestStore::new();
        let kp = crate::crypto::Keypair::generate();
        let mut pool = OneFeeTx(true);

        let block = proposer.build_block(&store, &kp, &mut pool, 1_700_000_000);
        assert_eq!(block.txs[0].amount, cfg.block_reward + 5);
    }
}
