//! Gossip wire messages.
//!
//! Every message on the wire is an [`Envelope`] carrying a typed
//! [`Payload`], a hop counter, a time-to-live, and a send timestamp. The
//! hop/ttl pair bounds how far a message can propagate through the
//! network before peers stop relaying it.

use serde::{Deserialize, Serialize};

use crate::types::{Block, BlockHash, Transaction};

/// Feature flags exchanged during handshake, allowing the protocol to
/// evolve without breaking compatibility between mismatched builds.
pub const PROTOCOL_VERSION: u32 = 1;

/// The body of a gossip message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Payload {
    Handshake {
        node_id: String,
        protocol_version: u32,
        features: Vec<String>,
    },
    Tx(Transaction),
    Block(Block),
    Ping,
    Pong,
    /// Requests every block from `from_height` onward on the sender's
    /// canonical chain, used during catch-up sync.
    GetBlocksFrom { from_height: u64 },
    /// A batch of blocks sent in response to [`Payload::GetBlocksFrom`],
    /// ordered by ascending height.
    Blocks(Vec<Block>),
    /// A peer's claim about its trusted checkpoint, exchanged so both
    /// sides can detect a conflicting, irreconcilable history before
    /// syncing any blocks.
    CheckpointClaim { height: u64, hash: BlockHash },
}

/// Wire envelope wrapping a [`Payload`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub data: Payload,
    pub hops: u32,
    pub ttl: u32,
    pub ts: u64,
}

/// Coarse message category, kept separate from [`Payload`]'s internal tag
/// so peers can cheaply filter without deserializing the full payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    Handshake,
    Tx,
    Block,
    Ping,
    Pong,
    GetBlocksFrom,
    Blocks,
    CheckpointClaim,
}

impl Envelope {
    pub fn new(payload: Payload, ttl: u32, ts: u64) -> Self {
        let kind = match &payload {
            Payload::Handshake { .. } => EnvelopeKind::Handshake,
            Payload::Tx(_) => EnvelopeKind::Tx,
            Payload::Block(_) => EnvelopeKind::Block,
            Payload::Ping => EnvelopeKind::Ping,
            Payload::Pong => EnvelopeKind::Pong,
            Payload::GetBlocksFrom { .. } => EnvelopeKind::GetBlocksFrom,
            Payload::Blocks(_) => EnvelopeKind::Blocks,
            Payload::CheckpointClaim { .. } => EnvelopeKind::CheckpointClaim,
        };
        Self {
            kind,
            data: payload,
            hops: 0,
            ttl,
            ts,
        }
    }

    /// Returns a copy with `hops` incremented, or `None` if the TTL has
    /// been exhausted and the message must not be relayed further.
    pub fn forwarded(&self) -> Option<Self> {
        if self.hops >= self.ttl {
            return None;
        }
        let mut next = self.clone();
        next.hops += 1;
        Some(next)
    }
}
