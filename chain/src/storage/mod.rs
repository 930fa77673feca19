//! Storage backends for the chain.
//!
//! This module provides concrete implementations of
//! [`crate::consensus::store::ChainStore`]:
//!
//! - an in-memory store ([`mem::InMemoryChainStore`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbChainStore`]) for persistent
//!   validator nodes, keyed by height, hash, and address.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryChainStore;
pub use rocksdb::{RocksDbChainStore, RocksDbConfig, StorageError};
