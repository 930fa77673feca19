//! Error types shared across the consensus engine.

use crate::state::StateError;
use crate::storage::StorageError;
use crate::types::block::BlockError;

/// High-level errors that can occur while proposing or importing a block.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("structural validation failed: {0}")]
    Structural(#[from] BlockError),
    #[error("semantic validation failed: {0}")]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("block does not extend a known parent")]
    UnknownParent,
    #[error("block was proposed by a validator not eligible at this height")]
    IneligibleValidator,
    #[error("{0}")]
    Other(String),
}
