// chain/src/types/block.rs

//! Block types, Merkle commitment, and canonical hashing.
//!
//! Serialization mirrors [`super::tx`]: a hand-rolled, big-endian,
//! length-prefixed byte format so independent implementations agree on
//! block hashes bit-for-bit. The block hash commits to the header only
//! (including the Merkle root); the transaction list itself is
//! length-prefixed separately when framed for the network, but is never
//! part of the header hash.

use serde::{Deserialize, Serialize};

use super::{Address, Hash256, PublicKey, Signature, Transaction, TransactionKind};
use crate::crypto;

/// Strongly-typed block hash: SHA-256 over the canonical header bytes.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        Hash256::from_hex(s).map(BlockHash)
    }

    /// The all-zero hash used as the parent of genesis.
    pub fn zero() -> Self {
        BlockHash(Hash256([0u8; 32]))
    }
}

impl std::fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Block header: everything needed to link, order, and attribute a
/// block, minus the transaction list and the validator's signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Header {
    pub height: u64,
    pub timestamp: u64,
    pub prev_hash: BlockHash,
    pub merkle_root: Hash256,
    pub validator: Address,
    /// SEC1-compressed public key behind `validator`, carried so peers can
    /// verify the block signature without a separate key registry.
    pub validator_pubkey: PublicKey,
    pub reward: u64,
}

impl Header {
    /// Canonical header bytes: all fields, big-endian fixed width.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 32 + 32 + 32 + 2 + self.validator_pubkey.0.len() + 8);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(self.merkle_root.as_bytes());
        buf.extend_from_slice(self.validator.as_bytes());
        buf.extend_from_slice(&(self.validator_pubkey.0.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.validator_pubkey.0);
        buf.extend_from_slice(&self.reward.to_be_bytes());
        buf
    }
}

/// Block = header + list of transactions, plus the validator's signature
/// over the header.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub signature: Signature,
    pub txs: Vec<Transaction>,
}

/// Errors surfaced while validating a block's structural invariants.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum BlockError {
    #[error("invalid validator signature")]
    InvalidSignature,
    #[error("invalid canonical encoding")]
    InvalidEncoding,
    #[error("block exceeds the configured transaction limit")]
    SizeExceeded,
    #[error("Merkle root does not match the computed root over transaction hashes")]
    BadMerkleRoot,
    #[error("block must start with exactly one Coinbase transaction")]
    MissingOrMisplacedCoinbase,
    #[error("timestamp is too far in the future")]
    TimestampOutOfWindow,
    #[error("block timestamp does not respect the minimum block-time gap")]
    BlockTimeTooEarly,
    #[error("block height does not follow the parent")]
    WrongHeight,
    #[error("block does not extend the current head")]
    WrongParent,
    #[error("validator address does not match the embedded public key")]
    ValidatorAddressMismatch,
}

/// Computes the Merkle root over `tx_hashes` by pairwise SHA-256
/// hashing, duplicating the last element when the level count is odd.
pub fn merkle_root(tx_hashes: &[Hash256]) -> Hash256 {
    if tx_hashes.is_empty() {
        return Hash256::compute(&[]);
    }

    let mut level: Vec<Hash256> = tx_hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| Hash256::compute_pair(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

impl Block {
    /// Computes the block hash: SHA-256 over the canonical header bytes.
    /// Excludes the signature and the transaction list.
    pub fn hash(&self) -> BlockHash {
        BlockHash(Hash256::compute(&self.header.canonical_bytes()))
    }

    /// Recomputes the Merkle root over this block's transaction hashes.
    pub fn merkle_root(&self) -> Hash256 {
        let hashes: Vec<Hash256> = self.txs.iter().map(Transaction::hash).collect();
        merkle_root(&hashes)
    }

    /// Signs the header in place using the validator's keypair.
    pub fn sign(&mut self, keypair: &crypto::Keypair) {
        let digest = self.hash();
        self.signature = keypair.sign(digest.0.as_bytes());
    }

    /// Verifies everything that does not require chain state:
    ///
    /// - exactly one Coinbase, in the first position, paying exactly
    ///   `block_reward` plus the sum of the block's other transactions'
    ///   fees to `header.validator` (and agreeing with `header.reward`),
    /// - the Merkle root matches the transaction list,
    /// - the validator's signature verifies,
    /// - the transaction count is within `max_txs`.
    ///
    /// Parent linkage, height continuity, and block-time pacing are
    /// checked separately (see [`Block::verify_against_parent`]).
    pub fn verify_structure(&self, max_txs: usize, block_reward: u64) -> Result<(), BlockError> {
        if self.txs.len() > max_txs {
            return Err(BlockError::SizeExceeded);
        }

        if Address::from_public_key(&self.header.validator_pubkey.0) != self.header.validator {
            return Err(BlockError::ValidatorAddressMismatch);
        }

        match self.txs.first() {
            Some(first) if first.kind == TransactionKind::Coinbase => {
                let fees: u64 = self.txs[1..].iter().map(|tx| tx.fee).sum();
                let expected_amount = block_reward.saturating_add(fees);
                if first.recipient != self.header.validator
                    || first.amount != expected_amount
                    || self.header.reward != first.amount
                {
                    return Err(BlockError::MissingOrMisplacedCoinbase);
                }
            }
            _ => return Err(BlockError::MissingOrMisplacedCoinbase),
        }
        if self.txs[1..]
            .iter()
            .any(|tx| tx.kind == TransactionKind::Coinbase)
        {
            return Err(BlockError::MissingOrMisplacedCoinbase);
        }

        if self.merkle_root() != self.header.merkle_root {
            return Err(BlockError::BadMerkleRoot);
        }

        let digest = self.hash();
        if !crypto::verify(
            &self.header.validator_pubkey,
            digest.0.as_bytes(),
            &self.signature,
        ) {
            return Err(BlockError::InvalidSignature);
        }

        Ok(())
    }

    /// Checks height continuity, parent linkage, and block-time pacing
    /// against `parent`: `timestamp >= prev.timestamp + 0.8*block_time`.
    pub fn verify_against_parent(
        &self,
        parent: &Block,
        parent_hash: BlockHash,
        block_time_secs: u64,
    ) -> Result<(), BlockError> {
        if self.header.height != parent.header.height + 1 {
            return Err(BlockError::WrongHeight);
        }
        if self.header.prev_hash.as_bytes() != parent_hash.as_bytes() {
            return Err(BlockError::WrongParent);
        }
        let min_gap = (block_time_secs as f64 * 0.8).floor() as u64;
        if self.header.timestamp < parent.header.timestamp.saturating_add(min_gap) {
            return Err(BlockError::BlockTimeTooEarly);
        }
        Ok(())
    }

    pub fn check_timestamp(&self, now: u64, tolerance_secs: u64) -> Result<(), BlockError> {
        if self.header.timestamp > now.saturating_add(tolerance_secs) {
            return Err(BlockError::TimestampOutOfWindow);
        }
        Ok(())
    }
}
