//! Node orchestration: wires the consensus engine, mempool, gossip engine,
//! and peer connections together into a running validator.
//!
//! The node holds its mutable state (consensus engine, mempool, gossip
//! dedup/rate-limit state) behind a single [`std::sync::Mutex`], following
//! the shared-state-behind-a-lock pattern common to small async services:
//! connection tasks and the miner task all reach the same lock, hold it
//! only for the synchronous work, and never await while holding it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::consensus::engine::ConsensusEngine;
use crate::consensus::fork_choice::StakeWeightedForkChoice;
use crate::consensus::selection::{self, Candidate};
use crate::consensus::store::{ChainStore, Checkpoint};
use crate::consensus::validator::{CombinedValidator, SemanticValidator, StructuralValidator};
use crate::crypto::Keypair;
use crate::gossip::message::{Envelope, EnvelopeKind, Payload};
use crate::gossip::{GossipEngine, ReceiveOutcome};
use crate::mempool::Mempool;
use crate::metrics::MetricsRegistry;
use crate::network::{FrameError, read_frame, write_frame};
use crate::peer::{PeerRecord, PeerState};
use crate::storage::RocksDbChainStore;
use crate::sync::SyncEngine;
use crate::types::{Address, BlockHash, Hash256};

/// Concrete validator stack used by a running node: cheap structural
/// checks first, then the state-dependent semantic checks.
pub type NodeValidator = CombinedValidator<StructuralValidator, SemanticValidator>;

/// The concrete consensus engine type a node runs.
pub type NodeEngine = ConsensusEngine<RocksDbChainStore, NodeValidator, StakeWeightedForkChoice>;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

struct PeerHandle {
    record: PeerRecord,
    outbox: mpsc::UnboundedSender<Envelope>,
}

/// Mutable state shared across every connection task and the miner task.
struct Shared {
    engine: NodeEngine,
    mempool: Mempool,
    gossip: GossipEngine,
    peers: HashMap<SocketAddr, PeerHandle>,
}

/// A running validator node.
pub struct Node {
    config: NodeConfig,
    identity: Keypair,
    shared: Arc<Mutex<Shared>>,
    metrics: Arc<MetricsRegistry>,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Derives a stable gossip identity from a peer's self-reported node id.
/// This is a convenience address used purely for rate-limiting and ban
/// bookkeeping; it carries no on-chain meaning unless the peer happens to
/// also be a staked validator using the same identity.
fn gossip_identity(node_id: &str) -> Address {
    Address(Hash256::compute(node_id.as_bytes()))
}

impl Node {
    pub fn new(config: NodeConfig, identity: Keypair) -> Result<Self, NodeError> {
        let store = RocksDbChainStore::open(&config.storage)?;
        let metrics = Arc::new(MetricsRegistry::new()?);

        let validator = CombinedValidator::new(
            StructuralValidator {
                config: config.consensus.clone(),
            },
            SemanticValidator {
                config: config.consensus.clone(),
            },
        );
        let mut engine = ConsensusEngine::new(
            config.consensus.clone(),
            store,
            validator,
            StakeWeightedForkChoice,
        );

        if engine.tip().is_none() {
            for allocation in &config.genesis.allocations {
                engine.store_mut().state_mut().set_account(
                    allocation.address,
                    crate::state::Account {
                        balance: allocation.balance,
                        stake: allocation.stake,
                        nonce: 0,
                    },
                );
            }
        }

        let mempool = Mempool::new(config.mempool.clone());
        let gossip = GossipEngine::new(config.gossip.clone());

        let shared = Arc::new(Mutex::new(Shared {
            engine,
            mempool,
            gossip,
            peers: HashMap::new(),
        }));

        Ok(Self {
            config,
            identity,
            shared,
            metrics,
        })
    }

    pub fn address(&self) -> Address {
        self.identity.address()
    }

    /// Runs the node until the process is terminated: binds the peer
    /// listener, dials configured bootstrap peers, starts the metrics
    /// exporter, and runs the miner loop. Each of these runs as its own
    /// Tokio task; this function itself drives the miner loop and never
    /// returns under normal operation.
    pub async fn run(self: Arc<Self>) -> Result<(), NodeError> {
        if self.config.metrics.enabled {
            let metrics = self.metrics.clone();
            let addr = self.config.metrics.listen_addr;
            tokio::spawn(async move {
                if let Err(err) = crate::metrics::run_prometheus_http_server(metrics, addr).await
                {
                    tracing::error!(error = %err, "metrics HTTP server exited");
                }
            });
        }

        let listener = TcpListener::bind(self.config.network.listen_addr).await?;
        tracing::info!(addr = %self.config.network.listen_addr, "listening for peers");

        {
            let this = self.clone();
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            let this = this.clone();
                            tokio::spawn(async move {
                                this.handle_connection(stream, addr).await;
                            });
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to accept connection");
                        }
                    }
                }
            });
        }

        for peer_addr in self.config.network.bootstrap_peers.clone() {
            let this = self.clone();
            tokio::spawn(async move {
                match TcpStream::connect(peer_addr).await {
                    Ok(stream) => this.handle_connection(stream, peer_addr).await,
                    Err(err) => {
                        tracing::warn!(peer = %peer_addr, error = %err, "failed to dial bootstrap peer")
                    }
                }
            });
        }

        self.miner_loop().await;
        Ok(())
    }

    /// Checks whether this node is the selected validator for the next
    /// block and, if so and enough time has elapsed since the last
    /// block, proposes and broadcasts one. Runs forever.
    async fn miner_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.proposal_check_interval);
        loop {
            ticker.tick().await;
            if let Some((hash, envelopes)) = self.try_propose() {
                tracing::info!(hash = %hash, "proposed block");
                for envelope in envelopes {
                    self.broadcast(envelope, None);
                }
            }
        }
    }

    /// Advances the local checkpoint to `(height, hash)` if checkpointing
    /// is enabled, `height` falls on the configured interval, and it is
    /// past the last checkpoint. Returns an envelope to broadcast the new
    /// checkpoint claim to peers, if one was set.
    fn maybe_checkpoint(&self, shared: &mut Shared, height: u64, hash: BlockHash) -> Option<Envelope> {
        if !self.config.checkpoint.enabled || self.config.checkpoint.every == 0 {
            return None;
        }
        if height % self.config.checkpoint.every != 0 {
            return None;
        }
        if shared.engine.store().checkpoint().is_some_and(|cp| cp.height >= height) {
            return None;
        }
        shared.engine.store_mut().set_checkpoint(Checkpoint { height, hash });
        tracing::info!(height, hash = %hash, "advanced local checkpoint");
        Some(Envelope::new(
            Payload::CheckpointClaim { height, hash },
            1,
            now_unix(),
        ))
    }

    fn try_propose(&self) -> Option<(BlockHash, Vec<Envelope>)> {
        let mut shared = self.shared.lock().unwrap();

        let tip_block = shared.engine.tip_block();
        if let Some(ref tip) = tip_block {
            let elapsed = now_unix().saturating_sub(tip.header.timestamp);
            if elapsed < self.config.consensus.block_time_secs {
                return None;
            }
        }

        let parent_hash = tip_block
            .as_ref()
            .map(|b| b.hash().0)
            .unwrap_or_else(|| Hash256::compute(b"genesis"));
        let next_height = tip_block.as_ref().map(|b| b.header.height + 1).unwrap_or(0);
        let candidates: Vec<Candidate> = shared
            .engine
            .store()
            .state()
            .iter()
            .filter(|(_, account)| account.stake >= self.config.consensus.min_validator_stake)
            .map(|(address, account)| Candidate {
                address: *address,
                stake: account.stake,
            })
            .collect();

        if !candidates.is_empty() {
            let winner = selection::select_validator(&parent_hash, next_height, &candidates);
            if winner != Some(self.identity.address()) {
                return None;
            }
        }

        let timestamp = now_unix();
        let identity = &self.identity;
        let result = {
            let Shared {
                engine, mempool, ..
            } = &mut *shared;
            engine.propose_block(identity, mempool, timestamp)
        };

        match result {
            Ok((hash, block)) => {
                shared.mempool.remove_applied(&block);
                self.metrics.node.blocks_applied_total.inc();
                let height = block.header.height;
                let mut envelopes = vec![Envelope::new(Payload::Block(block), 8, timestamp)];
                if let Some(checkpoint_envelope) = self.maybe_checkpoint(&mut shared, height, hash) {
                    envelopes.push(checkpoint_envelope);
                }
                Some((hash, envelopes))
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to propose block");
                None
            }
        }
    }

    /// Sends `envelope` to every known, usable peer, optionally excluding
    /// the peer it was received from to avoid an immediate echo.
    fn broadcast(&self, envelope: Envelope, exclude: Option<SocketAddr>) {
        let shared = self.shared.lock().unwrap();
        for (addr, handle) in shared.peers.iter() {
            if Some(*addr) != exclude && handle.record.is_usable() {
                let _ = handle.outbox.send(envelope.clone());
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

        {
            let mut shared = self.shared.lock().unwrap();
            shared.peers.insert(
                addr,
                PeerHandle {
                    record: PeerRecord::new(addr.to_string(), addr, std::time::Instant::now()),
                    outbox: tx.clone(),
                },
            );
        }

        let handshake = Envelope::new(
            Payload::Handshake {
                node_id: self.address().to_hex(),
                protocol_version: crate::gossip::PROTOCOL_VERSION,
                features: Vec::new(),
            },
            1,
            now_unix(),
        );
        let _ = tx.send(handshake);

        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if write_frame(&mut writer, &envelope).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match read_frame::<_, Envelope>(&mut reader).await {
                Ok(envelope) => self.handle_envelope(addr, envelope),
                Err(FrameError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(err) => {
                    tracing::debug!(peer = %addr, error = %err, "dropping peer after frame error");
                    break;
                }
            }
        }

        writer_task.abort();
        let mut shared = self.shared.lock().unwrap();
        shared.peers.remove(&addr);
    }

    fn handle_envelope(&self, addr: SocketAddr, envelope: Envelope) {
        let now = std::time::Instant::now();
        self.metrics.node.gossip_messages_received_total.inc();

        let mut shared = self.shared.lock().unwrap();

        let gossip_id = shared
            .peers
            .get(&addr)
            .map(|p| gossip_identity(&p.record.node_id))
            .unwrap_or_else(|| gossip_identity(&addr.to_string()));

        match shared.gossip.receive(gossip_id, &envelope, now) {
            ReceiveOutcome::Banned => return,
            ReceiveOutcome::RateLimited => {
                self.metrics.node.peer_violations_total.inc();
                return;
            }
            ReceiveOutcome::Duplicate => {
                self.metrics.node.gossip_messages_deduped_total.inc();
                if !matches!(envelope.kind, EnvelopeKind::GetBlocksFrom | EnvelopeKind::Blocks) {
                    return;
                }
            }
            ReceiveOutcome::Accept => {}
        }

        match envelope.data.clone() {
            Payload::Handshake {
                node_id,
                protocol_version,
                ..
            } => {
                if let Some(peer) = shared.peers.get_mut(&addr) {
                    peer.record.node_id = node_id;
                    peer.record.protocol_version = protocol_version;
                    let _ = peer.record.transition(PeerState::Ready);
                }
            }
            Payload::Tx(tx) => {
                let admitted = {
                    let Shared { engine, mempool, .. } = &mut *shared;
                    mempool.admit(tx, engine.store().state()).is_ok()
                };
                if admitted {
                    self.metrics.node.mempool_admitted_total.inc();
                    self.metrics.node.mempool_size.set(shared.mempool.len() as f64);
                    drop(shared);
                    if let Some(forwarded) = envelope.forwarded() {
                        self.broadcast(forwarded, Some(addr));
                    }
                    return;
                }
            }
            Payload::Block(block) => {
                let result = shared.engine.import_block(block.clone());
                match result {
                    Ok(hash) => {
                        shared.mempool.remove_applied(&block);
                        self.metrics.node.blocks_applied_total.inc();
                        let checkpoint_envelope =
                            self.maybe_checkpoint(&mut shared, block.header.height, hash);
                        drop(shared);
                        if let Some(forwarded) = envelope.forwarded() {
                            self.broadcast(forwarded, Some(addr));
                        }
                        if let Some(checkpoint_envelope) = checkpoint_envelope {
                            self.broadcast(checkpoint_envelope, None);
                        }
                        return;
                    }
                    Err(err) => {
                        tracing::debug!(peer = %addr, error = %err, "rejected block");
                        self.metrics.node.blocks_rejected_total.inc();
                    }
                }
            }
            Payload::Ping => {
                if let Some(peer) = shared.peers.get(&addr) {
                    let _ = peer.outbox.send(Envelope::new(Payload::Pong, 1, now_unix()));
                }
            }
            Payload::Pong => {}
            Payload::GetBlocksFrom { from_height } => {
                self.metrics.node.sync_sessions_total.inc();
                let response =
                    SyncEngine::serve_request(shared.engine.store(), from_height, self.config.network.max_sync_batch);
                if let Some(peer) = shared.peers.get(&addr) {
                    let _ = peer.outbox.send(Envelope::new(response, 1, now_unix()));
                }
            }
            Payload::Blocks(blocks) => {
                if let Err(err) = SyncEngine::apply_batch(&mut shared.engine, blocks) {
                    tracing::warn!(peer = %addr, error = %err, "sync batch rejected");
                }
            }
            Payload::CheckpointClaim { height, hash } => {
                let local = shared.engine.store().checkpoint();
                if SyncEngine::check_checkpoint::<RocksDbChainStore>(local, height, hash).is_err()
                {
                    tracing::warn!(peer = %addr, height, "conflicting checkpoint claim, aborting sync");
                    if let Some(peer) = shared.peers.get_mut(&addr) {
                        let _ = peer.record.transition(PeerState::Banned);
                    }
                    self.metrics.node.peer_bans_total.inc();
                }
            }
        }
    }
}
