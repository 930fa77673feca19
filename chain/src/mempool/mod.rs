//! Transaction mempool.
//!
//! Holds transactions waiting for inclusion in a block. Ordering is
//! priority-based: higher fee first, then earlier timestamp, then the
//! lexicographically smaller transaction hash as a final, fully
//! deterministic tiebreak. Each sender may have at most one pending
//! transaction per nonce; submitting a transaction that collides with an
//! already-pending one only replaces it if the new fee is strictly higher
//! (spam-resistant fee bump, the same idea as a classic "replace-by-fee"
//! rule).

use std::collections::{BTreeSet, HashMap};

use crate::consensus::proposer::TxPool;
use crate::state::ChainState;
use crate::types::{Address, Block, Hash256, Transaction, TransactionKind};

/// Errors returned by [`Mempool::admit`].
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum MempoolError {
    #[error("transaction failed structural verification: {0}")]
    InvalidTransaction(#[from] crate::types::TxError),
    #[error("mempool is full")]
    Full,
    #[error("a pending transaction with this nonce already has a higher or equal fee")]
    Underpriced,
    #[error("nonce {got} is below the sender's current on-chain nonce {expected}")]
    BadNonce { expected: u64, got: u64 },
    #[error("fee {got} is below the configured minimum {min}")]
    FeeTooLow { min: u64, got: u64 },
    #[error("sender balance cannot cover the transaction's amount and fee")]
    InsufficientBalance,
}

/// Ordering key used to keep transactions sorted by priority in a
/// `BTreeSet`: fee descending, timestamp ascending, hash ascending.
#[derive(Clone, Copy, Eq, PartialEq)]
struct PriorityKey {
    neg_fee: std::cmp::Reverse<u64>,
    timestamp: u64,
    hash: Hash256,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_fee
            .cmp(&other.neg_fee)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Configuration for [`Mempool`].
#[derive(Clone, Debug)]
pub struct MempoolConfig {
    /// Maximum number of transactions the mempool will hold at once.
    pub max_size: usize,
    /// Minimum fee a non-Coinbase transaction must carry to be admitted.
    pub min_fee: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 50_000,
            min_fee: 0,
        }
    }
}

/// In-memory transaction pool, keyed by sender+nonce for uniqueness and
/// ordered by priority for block assembly.
pub struct Mempool {
    config: MempoolConfig,
    by_key: HashMap<(Address, u64), Transaction>,
    order: BTreeSet<(PriorityKey, Address, u64)>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            by_key: HashMap::new(),
            order: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn priority_key(tx: &Transaction) -> PriorityKey {
        PriorityKey {
            neg_fee: std::cmp::Reverse(tx.fee),
            timestamp: tx.timestamp,
            hash: tx.hash(),
        }
    }

    /// Validates and admits a transaction.
    ///
    /// Structural verification (signature, size, address/pubkey match) is
    /// delegated to [`Transaction::verify`]. On top of that, admission
    /// checks the submitted transaction against `state` in order: the
    /// nonce must not be stale, the fee must meet the configured minimum,
    /// and the sender's balance must cover what the transaction would
    /// actually spend. Coinbase transactions never pass through here; they
    /// are only ever constructed by a block's own proposer.
    pub fn admit(&mut self, tx: Transaction, state: &ChainState) -> Result<(), MempoolError> {
        tx.verify()?;

        let account = state.get(&tx.sender);
        if tx.nonce < account.nonce {
            return Err(MempoolError::BadNonce {
                expected: account.nonce,
                got: tx.nonce,
            });
        }
        if tx.fee < self.config.min_fee {
            return Err(MempoolError::FeeTooLow {
                min: self.config.min_fee,
                got: tx.fee,
            });
        }
        match tx.kind {
            TransactionKind::Transfer | TransactionKind::Stake => {
                let required = tx.amount.saturating_add(tx.fee);
                if account.balance < required {
                    return Err(MempoolError::InsufficientBalance);
                }
            }
            TransactionKind::Unstake => {
                if tx.amount > account.stake || account.balance < tx.fee {
                    return Err(MempoolError::InsufficientBalance);
                }
            }
            TransactionKind::Coinbase => {}
        }

        let key = (tx.sender, tx.nonce);
        if let Some(existing) = self.by_key.get(&key) {
            if tx.fee <= existing.fee {
                return Err(MempoolError::Underpriced);
            }
            let old_priority = Self::priority_key(existing);
            self.order.remove(&(old_priority, tx.sender, tx.nonce));
        } else if self.by_key.len() >= self.config.max_size {
            return Err(MempoolError::Full);
        }

        let priority = Self::priority_key(&tx);
        self.order.insert((priority, tx.sender, tx.nonce));
        self.by_key.insert(key, tx);
        Ok(())
    }

    /// Removes every transaction that a just-applied block included, plus
    /// any pending transaction from the same sender whose nonce has now
    /// been superseded (nonce strictly less than the sender's new nonce
    /// would require state lookups this pool doesn't have, so callers
    /// that need full nonce-gap eviction should drain per-sender via
    /// [`Mempool::evict_sender_below`] after applying the block).
    pub fn remove_applied(&mut self, block: &Block) {
        for tx in &block.txs {
            let key = (tx.sender, tx.nonce);
            if let Some(existing) = self.by_key.remove(&key) {
                let priority = Self::priority_key(&existing);
                self.order.remove(&(priority, tx.sender, tx.nonce));
            }
        }
    }

    /// Drops every pending transaction for `sender` whose nonce is below
    /// `current_nonce`, i.e. transactions that can never apply again. Only
    /// transactions whose nonce exactly equals `current_nonce` remain
    /// eligible for re-admission into the next block.
    pub fn evict_sender_below(&mut self, sender: Address, current_nonce: u64) {
        let stale: Vec<(Address, u64)> = self
            .by_key
            .keys()
            .filter(|(addr, nonce)| *addr == sender && *nonce < current_nonce)
            .copied()
            .collect();
        for key in stale {
            if let Some(tx) = self.by_key.remove(&key) {
                let priority = Self::priority_key(&tx);
                self.order.remove(&(priority, key.0, key.1));
            }
        }
    }

    pub fn get(&self, sender: Address, nonce: u64) -> Option<&Transaction> {
        self.by_key.get(&(sender, nonce))
    }
}

impl TxPool for Mempool {
    fn select_for_block(&mut self, max_txs: usize, max_bytes: usize) -> Vec<Transaction> {
        let mut selected = Vec::new();
        let mut size = 0usize;
        let mut to_remove = Vec::new();

        for (priority, sender, nonce) in self.order.iter() {
            if selected.len() >= max_txs {
                break;
            }
            let Some(tx) = self.by_key.get(&(*sender, *nonce)) else {
                continue;
            };
            let encoded = tx.canonical_bytes();
            if size + encoded.len() > max_bytes {
                continue;
            }
            size += encoded.len();
            selected.push(tx.clone());
            to_remove.push((*priority, *sender, *nonce));
        }

        for key in &to_remove {
            self.order.remove(key);
        }
        for (_, sender, nonce) in to_remove {
            self.by_key.remove(&(sender, nonce));
        }

        selected
    }
}
