// chain/src/types/tx.rs

//! Transaction types for the ledger.
//!
//! This module defines the single [`Transaction`] struct shared by all
//! transaction kinds, its canonical byte encoding, and the hashing and
//! signing operations built on top of it. The canonical encoding is
//! hand-rolled (not `bincode`/`serde_json`) because it must stay
//! byte-exact across independent implementations: integers are
//! big-endian fixed-width, addresses are raw 32-byte values, and the
//! data blob is length-prefixed.

use serde::{Deserialize, Serialize};

use super::{Address, Hash256, PublicKey, Signature};
use crate::crypto;

/// Upper bound on the `data` blob carried by a transaction.
pub const MAX_DATA_LEN: usize = 4096;

/// The kind of a transaction, fixed at four variants (no smart contracts).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    Transfer = 0,
    Stake = 1,
    Unstake = 2,
    Coinbase = 3,
}

impl TransactionKind {
    fn tag(self) -> u8 {
        self as u8
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Transfer),
            1 => Some(Self::Stake),
            2 => Some(Self::Unstake),
            3 => Some(Self::Coinbase),
            _ => None,
        }
    }
}

/// A signed ledger transaction.
///
/// `Coinbase` transactions have no sender and no signature: `sender` and
/// `public_key` are the all-zero address/empty key by convention, and
/// [`Transaction::verify`] special-cases them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub kind: TransactionKind,
    pub data: Vec<u8>,
    pub timestamp: u64,
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// Errors produced by [`Transaction::verify`] and its canonical codec.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum TxError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid canonical encoding")]
    InvalidEncoding,
    #[error("data blob exceeds {MAX_DATA_LEN} bytes")]
    SizeExceeded,
    #[error("coinbase transaction may not carry a sender or signature")]
    InvalidCoinbase,
    #[error("address does not match the embedded public key")]
    AddressMismatch,
    #[error("timestamp is too far in the future")]
    TimestampOutOfWindow,
}

impl Transaction {
    /// Builds the canonical byte encoding used for hashing and signing.
    ///
    /// This excludes the signature field; everything else (including
    /// `kind` and `data`) is covered.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 32 + 8 + 8 + 8 + 1 + 4 + self.data.len() + 8 + 2 + self.public_key.0.len());
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.push(self.kind.tag());
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&(self.public_key.0.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.public_key.0);
        buf
    }

    /// Computes the transaction hash (SHA-256 of [`Transaction::canonical_bytes`]).
    ///
    /// This is the transaction's identity: it excludes the signature so
    /// that the hash can be computed before signing and is what gets
    /// signed.
    pub fn hash(&self) -> Hash256 {
        Hash256::compute(&self.canonical_bytes())
    }

    /// Signs this transaction in place using `keypair`, filling in
    /// `public_key` and `signature`.
    pub fn sign(&mut self, keypair: &crypto::Keypair) {
        self.public_key = keypair.public_key();
        let digest = self.hash();
        self.signature = keypair.sign(digest.as_bytes());
    }

    /// Verifies structural invariants and the signature.
    ///
    /// Does not consult chain state; nonce/balance checks belong to the
    /// semantic validator and the mempool.
    pub fn verify(&self) -> Result<(), TxError> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(TxError::SizeExceeded);
        }

        if self.kind == TransactionKind::Coinbase {
            if !self.signature.0.is_empty() || !self.public_key.0.is_empty() {
                return Err(TxError::InvalidCoinbase);
            }
            return Ok(());
        }

        if self.fee > u64::MAX - self.amount {
            return Err(TxError::InvalidEncoding);
        }

        let expected_sender = Address::from_public_key(&self.public_key.0);
        if expected_sender != self.sender {
            return Err(TxError::AddressMismatch);
        }

        let digest = self.hash();
        if !crypto::verify(&self.public_key, digest.as_bytes(), &self.signature) {
            return Err(TxError::InvalidSignature);
        }

        Ok(())
    }

    /// Checks `timestamp` against `now + tolerance`; only the future bound
    /// is enforced, matching the block-timestamp rule.
    pub fn check_timestamp(&self, now: u64, tolerance_secs: u64) -> Result<(), TxError> {
        if self.timestamp > now.saturating_add(tolerance_secs) {
            return Err(TxError::TimestampOutOfWindow);
        }
        Ok(())
    }

    /// Builds the (unsigned) Coinbase transaction paying `reward` to
    /// `validator`, with accumulated fees folded into `amount`.
    pub fn coinbase(validator: Address, reward: u64, timestamp: u64) -> Transaction {
        Transaction {
            sender: Address(Hash256([0u8; 32])),
            recipient: validator,
            amount: reward,
            fee: 0,
            nonce: 0,
            kind: TransactionKind::Coinbase,
            data: Vec::new(),
            timestamp,
            public_key: PublicKey(Vec::new()),
            signature: Signature(Vec::new()),
        }
    }
}
