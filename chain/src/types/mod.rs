//! Core domain types used by the chain.
//!
//! This module defines strongly-typed hashes, addresses, and the
//! cryptographic key/signature wrappers shared across the ledger. The
//! goal is to avoid "naked" byte buffers in public APIs and instead use
//! domain-specific newtypes.

use serde::{Deserialize, Serialize};

pub mod block;
pub mod tx;

pub use block::{Block, BlockHash, Header};
pub use tx::{Transaction, TransactionKind, TxError};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (SHA-256).
///
/// This type is used as the backing representation for all fixed-size
/// hashes in the chain (addresses, block hashes, transaction hashes). It
/// is always exactly [`HASH_LEN`] bytes long.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the SHA-256 hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Hash256(out)
    }

    /// Hashes the concatenation of two hashes, used by [`block::merkle_root`].
    pub fn compute_pair(a: &Hash256, b: &Hash256) -> Self {
        let mut buf = [0u8; HASH_LEN * 2];
        buf[..HASH_LEN].copy_from_slice(&a.0);
        buf[HASH_LEN..].copy_from_slice(&b.0);
        Hash256::compute(&buf)
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Renders the hash as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hash from lowercase hex.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Some(Hash256(out))
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialOrd for Hash256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// Account address: 32 bytes derived deterministically from a public key.
///
/// Addresses are derived via [`Address::from_public_key`], which hashes
/// the SEC1-compressed encoding of an ECDSA P-256 public key with
/// SHA-256. `Coinbase` transactions carry no sender address.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Address(pub Hash256);

impl Address {
    /// Derives an [`Address`] from the canonical (SEC1 compressed) bytes
    /// of a public key.
    pub fn from_public_key(pk_bytes: &[u8]) -> Self {
        Address(Hash256::compute(pk_bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        Hash256::from_hex(s).map(Address)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// ECDSA P-256 public key, SEC1-compressed encoding.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

/// Detached ECDSA P-256 signature, fixed-size (r, s) encoding.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_roundtrips() {
        let h = Hash256::compute(b"hello");
        let hex = h.to_hex();
        let back = Hash256::from_hex(&hex).unwrap();
        assert_eq!(h.as_bytes(), back.as_bytes());
    }

    #[test]
    fn address_is_deterministic_hash_of_public_key() {
        let pk = b"a fake compressed sec1 public key";
        let a1 = Address::from_public_key(pk);
        let a2 = Address::from_public_key(pk);
        assert_eq!(a1, a2);
        assert_eq!(a1.as_bytes(), Hash256::compute(pk).as_bytes());
    }

    #[test]
    fn compute_pair_is_order_sensitive() {
        let a = Hash256::compute(b"a");
        let b = Hash256::compute(b"b");
        assert_ne!(
            Hash256::compute_pair(&a, &b).as_bytes(),
            Hash256::compute_pair(&b, &a).as_bytes()
        );
    }
}
