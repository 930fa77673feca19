//! Gossip engine: deduplication, fanout, and per-peer rate limiting.
//!
//! This is a deliberately custom, minimal gossip layer rather than an
//! off-the-shelf pubsub protocol: a node relays any envelope it has not
//! seen before to a bounded fanout of peers, decrementing the remaining
//! hop budget, and punishes peers that send too fast or too often with a
//! violation count that escalates to a timed ban.
//!
//! Every method that cares about time takes an explicit `now: Instant`
//! rather than calling `Instant::now()` itself, so tests can drive the
//! clock deterministically.

pub mod message;

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::types::{Address, Hash256};
pub use message::{Envelope, Payload, PROTOCOL_VERSION};

/// Bounded, time-evicting set of recently seen message fingerprints, used
/// to stop a node from relaying (or re-processing) the same message twice.
pub struct FingerprintCache {
    ttl: Duration,
    max_size: usize,
    seen: HashMap<Hash256, Instant>,
    order: VecDeque<Hash256>,
}

impl FingerprintCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(front) = self.order.front() {
            match self.seen.get(front) {
                Some(inserted_at) if now.duration_since(*inserted_at) > self.ttl => {
                    let fp = self.order.pop_front().unwrap();
                    self.seen.remove(&fp);
                }
                _ => break,
            }
        }
        while self.order.len() > self.max_size {
            if let Some(fp) = self.order.pop_front() {
                self.seen.remove(&fp);
            }
        }
    }

    /// Returns `true` if `fingerprint` was already present (a duplicate);
    /// otherwise records it and returns `false`.
    pub fn seen_before(&mut self, fingerprint: Hash256, now: Instant) -> bool {
        self.evict_expired(now);
        if self.seen.contains_key(&fingerprint) {
            return true;
        }
        self.seen.insert(fingerprint, now);
        self.order.push_back(fingerprint);
        false
    }
}

/// Computes a dedup fingerprint for an envelope's payload. Hops/ttl/ts are
/// excluded so the same underlying tx/block is recognized across relays
/// even though each hop mutates the hop count.
pub fn fingerprint(payload: &Payload) -> Hash256 {
    match payload {
        Payload::Tx(tx) => tx.hash(),
        Payload::Block(block) => block.hash().0,
        other => {
            let bytes = serde_json::to_vec(other).unwrap_or_default();
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            let digest = hasher.finalize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            Hash256(out)
        }
    }
}

/// Simple token-bucket rate limiter.
#[derive(Clone, Copy, Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Configuration for [`GossipEngine`].
#[derive(Clone, Debug)]
pub struct GossipConfig {
    pub fanout: usize,
    pub default_ttl: u32,
    pub fingerprint_ttl: Duration,
    pub fingerprint_cache_size: usize,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: f64,
    pub violations_before_ban: u32,
    pub ban_duration: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            default_ttl: 10,
            fingerprint_ttl: Duration::from_secs(300),
            fingerprint_cache_size: 10_000,
            rate_limit_per_sec: 100.0,
            rate_limit_burst: 200.0,
            violations_before_ban: 10,
            ban_duration: Duration::from_secs(300),
        }
    }
}

/// Per-peer bookkeeping for rate limiting and bans.
struct PeerGossipState {
    bucket: TokenBucket,
    violations: u32,
    banned_until: Option<Instant>,
}

/// Outcome of [`GossipEngine::receive`], telling the caller what to do
/// with an inbound envelope.
#[derive(Debug, Eq, PartialEq)]
pub enum ReceiveOutcome {
    /// New message: relay `forwarded` to up to `fanout` other peers.
    Accept,
    /// Already seen; drop silently.
    Duplicate,
    /// Peer exceeded its rate limit; dropped, violation recorded.
    RateLimited,
    /// Peer is currently banned; dropped without further processing.
    Banned,
}

/// Deduplicates, rate-limits, and tracks peer violations for gossiped
/// envelopes. Fanout selection itself is left to the caller (typically
/// [`crate::node::Node`]), which has the live peer list.
pub struct GossipEngine {
    config: GossipConfig,
    cache: FingerprintCache,
    peers: HashMap<Address, PeerGossipState>,
}

impl GossipEngine {
    pub fn new(config: GossipConfig) -> Self {
        let cache = FingerprintCache::new(config.fingerprint_ttl, config.fingerprint_cache_size);
        Self {
            config,
            cache,
            peers: HashMap::new(),
        }
    }

    fn peer_state(&mut self, peer: Address, now: Instant) -> &mut PeerGossipState {
        self.peers.entry(peer).or_insert_with(|| PeerGossipState {
            bucket: TokenBucket::new(
                self.config.rate_limit_burst,
                self.config.rate_limit_per_sec,
                now,
            ),
            violations: 0,
            banned_until: None,
        })
    }

    pub fn is_banned(&self, peer: &Address, now: Instant) -> bool {
        self.peers
            .get(peer)
            .and_then(|p| p.banned_until)
            .is_some_and(|until| now < until)
    }

    /// Processes one envelope received from `peer`.
    pub fn receive(&mut self, peer: Address, envelope: &Envelope, now: Instant) -> ReceiveOutcome {
        if self.is_banned(&peer, now) {
            return ReceiveOutcome::Banned;
        }

        let ban_duration = self.config.ban_duration;
        let violations_before_ban = self.config.violations_before_ban;
        let state = self.peer_state(peer, now);
        if !state.bucket.try_consume(now) {
            state.violations += 1;
            if state.violations >= violations_before_ban {
                state.banned_until = Some(now + ban_duration);
            }
            return ReceiveOutcome::RateLimited;
        }

        let fp = fingerprint(&envelope.data);
        if self.cache.seen_before(fp, now) {
            return ReceiveOutcome::Duplicate;
        }

        ReceiveOutcome::Accept
    }

    /// Current violation count for a peer, for metrics/debugging.
    pub fn violations(&self, peer: &Address) -> u32 {
        self.peers.get(peer).map(|p| p.violations).or(Some(0)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn duplicate_envelope_is_dropped() {
        let mut engine = GossipEngine::new(GossipConfig::default());
        let peer = Keypair::generate().address();
        let env = Envelope::new(Payload::Ping, 4, 0);
        let now = Instant::now();

        assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::Accept);
        assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::Duplicate);
    }

    #[test]
    fn rate_limit_trips_after_burst_exhausted() {
        let mut cfg = GossipConfig::default();
        cfg.rate_limit_burst = 2.0;
        cfg.rate_limit_per_sec = 0.0;
        let mut engine = GossipEngine::new(cfg);
        let peer = Keypair::generate().address();
        let now = Instant::now();

        let env1 = Envelope::new(Payload::Ping, 4, 0);
        let env2 = Envelope::new(Payload::Pong, 4, 0);
        let env3 = Envelope::new(Payload::Handshake {
            node_id: "x".into(),
            protocol_version: 1,
            features: vec![],
        }, 4, 0);

        assert_eq!(engine.receive(peer, &env1, now), ReceiveOutcome::Accept);
        assert_eq!(engine.receive(peer, &env2, now), ReceiveOutcome::Accept);
        assert_eq!(engine.receive(peer, &env3, now), ReceiveOutcome::RateLimited);
    }

    #[test]
    fn repeated_violations_escalate_to_a_ban() {
        let mut cfg = GossipConfig::default();
        cfg.rate_limit_burst = 0.0;
        cfg.rate_limit_per_sec = 0.0;
        cfg.violations_before_ban = 2;
        cfg.ban_duration = Duration::from_secs(60);
        let mut engine = GossipEngine::new(cfg);
        let peer = Keypair::generate().address();
        let now = Instant::now();

        let env = Envelope::new(Payload::Ping, 4, 0);
        assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::RateLimited);
        assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::RateLimited);
        assert!(engine.is_banned(&peer, now));
        assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::Banned);
    }

    #[test]
    fn fingerprint_cache_evicts_after_ttl() {
        let mut cache = FingerprintCache::new(Duration::from_millis(10), 100);
        let fp = Hash256::compute(b"x");
        let t0 = Instant::now();
        assert!(!cache.seen_before(fp, t0));
        assert!(cache.seen_before(fp, t0));

        let t1 = t0 + Duration::from_millis(50);
        assert!(!cache.seen_before(fp, t1));
    }
}
