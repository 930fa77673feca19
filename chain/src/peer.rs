//! Peer bookkeeping and connection state machine.
//!
//! A peer moves through a small state machine as its connection
//! progresses: it starts `Handshaking`, becomes `Ready` once the
//! handshake completes, may move to `Syncing` while it is the target of
//! a catch-up session, and can be closed cleanly or banned for
//! misbehavior. `Banned` and `Closed` are terminal; nothing transitions
//! out of them.

use std::net::SocketAddr;
use std::time::Instant;

use crate::types::Address;

/// Connection lifecycle state for a single peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PeerState {
    Handshaking,
    Ready,
    Syncing,
    Closed,
    Banned,
}

/// Errors returned by invalid [`PeerState`] transitions.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum PeerStateError {
    #[error("cannot transition from {from:?} to {to:?}")]
    InvalidTransition { from: PeerState, to: PeerState },
}

impl PeerState {
    /// Validates (without performing) a transition to `next`.
    pub fn can_transition_to(self, next: PeerState) -> bool {
        use PeerState::*;
        matches!(
            (self, next),
            (Handshaking, Ready)
                | (Handshaking, Closed)
                | (Handshaking, Banned)
                | (Ready, Syncing)
                | (Ready, Closed)
                | (Ready, Banned)
                | (Syncing, Ready)
                | (Syncing, Closed)
                | (Syncing, Banned)
        )
    }
}

/// Everything a node tracks about one remote peer.
#[derive(Debug)]
pub struct PeerRecord {
    pub node_id: String,
    pub address: SocketAddr,
    pub state: PeerState,
    pub protocol_version: u32,
    /// Highest block height this peer is known to have announced.
    pub known_height: u64,
    pub connected_at: Instant,
    /// The on-chain address this peer signs gossip with, once known
    /// (e.g. if it identifies itself as a validator during handshake).
    pub chain_address: Option<Address>,
}

impl PeerRecord {
    pub fn new(node_id: String, address: SocketAddr, connected_at: Instant) -> Self {
        Self {
            node_id,
            address,
            state: PeerState::Handshaking,
            protocol_version: 0,
            known_height: 0,
            connected_at,
            chain_address: None,
        }
    }

    /// Attempts to move this peer to `next`, returning an error if the
    /// transition is not allowed from the current state.
    pub fn transition(&mut self, next: PeerState) -> Result<(), PeerStateError> {
        if !self.state.can_transition_to(next) {
            return Err(PeerStateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.state, PeerState::Ready | PeerState::Syncing)
    }

    pub fn note_height(&mut self, height: u64) {
        if height > self.known_height {
            self.known_height = height;
        }
    }
}
