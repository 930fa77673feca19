//! Chain synchronization: initial catch-up and partition recovery.
//!
//! A node asks its peers for blocks starting at its own tip height and
//! applies whatever comes back through the same
//! [`crate::consensus::engine::ConsensusEngine::import_block`] path used
//! for gossiped blocks, so a syncing node can never install a block that
//! wouldn't also pass live validation. Before requesting any blocks, the
//! two sides exchange checkpoint claims; a peer whose trusted checkpoint
//! conflicts with ours at the same height is not a partition to heal but
//! a fork we must never adopt, so the session is aborted outright.

use crate::consensus::engine::ConsensusEngine;
use crate::consensus::error::ConsensusError;
use crate::consensus::fork_choice::ForkChoice;
use crate::consensus::store::{ChainStore, Checkpoint};
use crate::consensus::validator::BlockValidator;
use crate::gossip::Payload;
use crate::types::Block;

/// Errors returned while running a sync session.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("peer's trusted checkpoint at height {height} conflicts with ours")]
    CheckpointConflict { height: u64 },
    #[error("peer sent a batch of blocks out of order")]
    OutOfOrderBatch,
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

/// Drives a single catch-up session against one peer's responses.
///
/// This type holds no network I/O itself; the caller (typically
/// [`crate::node::Node`]) owns the connection and feeds inbound
/// [`Payload`] values in, receiving back what to send next.
pub struct SyncEngine;

impl SyncEngine {
    /// Checks a peer's checkpoint claim against our own trusted
    /// checkpoint, if we have one. Returns an error (aborting the sync
    /// session) if both sides claim a checkpoint at the same height with
    /// different hashes.
    pub fn check_checkpoint<S>(
        local_checkpoint: Option<Checkpoint>,
        peer_height: u64,
        peer_hash: crate::types::BlockHash,
    ) -> Result<(), SyncError>
    where
        S: ChainStore,
    {
        if let Some(local) = local_checkpoint {
            if local.height == peer_height && local.hash != peer_hash {
                return Err(SyncError::CheckpointConflict {
                    height: peer_height,
                });
            }
        }
        Ok(())
    }

    /// Builds the request to send a peer in order to catch up from our
    /// current tip.
    pub fn request_from<S: ChainStore>(store: &S) -> Payload {
        let from_height = store.height().map(|h| h + 1).unwrap_or(0);
        Payload::GetBlocksFrom { from_height }
    }

    /// Applies a batch of blocks received from a peer, in ascending
    /// height order, importing each one through the consensus engine.
    /// Stops at (and returns) the first import error rather than
    /// applying a partial, potentially inconsistent suffix.
    pub fn apply_batch<S, V, F>(
        engine: &mut ConsensusEngine<S, V, F>,
        blocks: Vec<Block>,
    ) -> Result<u64, SyncError>
    where
        S: ChainStore,
        V: BlockValidator,
        F: ForkChoice,
    {
        let mut last_height = None;
        for block in blocks {
            if let Some(prev) = last_height {
                if block.header.height != prev + 1 {
                    return Err(SyncError::OutOfOrderBatch);
                }
            }
            last_height = Some(block.header.height);
            engine.import_block(block)?;
        }
        Ok(last_height.unwrap_or(0))
    }

    /// Serves a [`Payload::GetBlocksFrom`] request against local storage,
    /// returning a response payload capped at `max_batch` blocks.
    pub fn serve_request<S: ChainStore>(store: &S, from_height: u64, max_batch: usize) -> Payload {
        let mut blocks = Vec::new();
        let mut height = from_height;
        while blocks.len() < max_batch {
            let Some(block) = store.get_block_by_height(height) else {
                break;
            };
            blocks.push(block);
            height += 1;
        }
        Payload::Blocks(blocks)
    }
}
