//! End-to-end tests that exercise the consensus engine, mempool, sync, and
//! gossip layers together through their public API, the way independent
//! node instances would in a real network.

use std::time::Instant;

use chain::consensus::config::ConsensusConfig;
use chain::consensus::fork_choice::StakeWeightedForkChoice;
use chain::consensus::selection::{select_validator, Candidate};
use chain::consensus::validator::{AcceptAllValidator, CombinedValidator, SemanticValidator, StructuralValidator};
use chain::crypto::Keypair;
use chain::state::Account;
use chain::{
    Address, ConsensusEngine, Envelope, GossipConfig, GossipEngine, InMemoryChainStore, Mempool,
    MempoolConfig, Payload, PublicKey, ReceiveOutcome, Signature, SyncEngine, Transaction,
    TransactionKind,
};

fn funded_engine(
    allocations: &[(Address, u64, u64)],
) -> ConsensusEngine<InMemoryChainStore, AcceptAllValidator, StakeWeightedForkChoice> {
    let mut engine = ConsensusEngine::new(
        ConsensusConfig::default(),
        InMemoryChainStore::new(),
        AcceptAllValidator,
        StakeWeightedForkChoice,
    );
    for (address, balance, stake) in allocations {
        engine.store_mut().state_mut().set_account(
            *address,
            Account {
                balance: *balance,
                stake: *stake,
                nonce: 0,
            },
        );
    }
    engine
}

fn transfer(sender: &Keypair, recipient: Address, amount: u64, fee: u64, nonce: u64, timestamp: u64) -> Transaction {
    let mut tx = Transaction {
        sender: sender.address(),
        recipient,
        amount,
        fee,
        nonce,
        kind: TransactionKind::Transfer,
        data: Vec::new(),
        timestamp,
        public_key: PublicKey(Vec::new()),
        signature: Signature(Vec::new()),
    };
    tx.sign(sender);
    tx
}

/// Mirrors what `Mempool` implements for `TxPool`, used where a plain
/// one-shot batch of preselected transactions is all a test needs.
struct FixedBatch(Vec<Transaction>);

impl chain::consensus::proposer::TxPool for FixedBatch {
    fn select_for_block(&mut self, max_txs: usize, _max_bytes: usize) -> Vec<Transaction> {
        let take = max_txs.min(self.0.len());
        self.0.drain(0..take).collect()
    }
}

#[test]
fn transfer_applies_and_advances_sender_nonce_across_two_blocks() {
    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let validator = Keypair::generate();

    let mut engine = funded_engine(&[(alice.address(), 1_000, 0), (validator.address(), 0, 0)]);

    let tx1 = transfer(&alice, bob.address(), 100, 1, 0, 1_700_000_000);
    let mut pool = FixedBatch(vec![tx1]);
    engine
        .propose_block(&validator, &mut pool, 1_700_000_000)
        .unwrap();

    assert_eq!(engine.store().state().get(&alice.address()).balance, 899);
    assert_eq!(engine.store().state().get(&alice.address()).nonce, 1);
    assert_eq!(engine.store().state().get(&bob.address()).balance, 100);

    let tx2 = transfer(&alice, bob.address(), 50, 1, 1, 1_700_000_010);
    let mut pool = FixedBatch(vec![tx2]);
    engine
        .propose_block(&validator, &mut pool, 1_700_000_010)
        .unwrap();

    assert_eq!(engine.store().state().get(&alice.address()).balance, 848);
    assert_eq!(engine.store().state().get(&alice.address()).nonce, 2);
    assert_eq!(engine.store().state().get(&bob.address()).balance, 150);
}

#[test]
fn a_stale_nonce_transaction_does_not_apply_but_does_not_abort_the_block() {
    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let validator = Keypair::generate();
    let mut engine = funded_engine(&[(alice.address(), 1_000, 0)]);

    // Two transactions reusing nonce 0: the proposer's block assembly
    // does not dedupe by nonce itself (that is the mempool's job), so
    // feeding both straight to `propose_block` exercises `ChainState`'s
    // own defense: the second application fails and the whole block is
    // rejected rather than partially applied.
    let tx_a = transfer(&alice, bob.address(), 10, 1, 0, 1_700_000_000);
    let tx_b = transfer(&alice, bob.address(), 20, 1, 0, 1_700_000_000);
    let mut pool = FixedBatch(vec![tx_a, tx_b]);

    let err = engine
        .propose_block(&validator, &mut pool, 1_700_000_000)
        .unwrap_err();
    assert!(matches!(err, chain::ConsensusError::State(_)));
    assert_eq!(engine.store().state().get(&alice.address()).nonce, 0);
    assert!(engine.tip().is_none());
}

fn enforced_engine(
    heavy: &Keypair,
    light: &Keypair,
) -> ConsensusEngine<InMemoryChainStore, CombinedValidator<StructuralValidator, SemanticValidator>, StakeWeightedForkChoice> {
    let cfg = ConsensusConfig {
        min_validator_stake: 1,
        ..ConsensusConfig::default()
    };
    let validator = CombinedValidator::new(
        StructuralValidator { config: cfg.clone() },
        SemanticValidator { config: cfg.clone() },
    );
    let mut engine = ConsensusEngine::new(cfg, InMemoryChainStore::new(), validator, StakeWeightedForkChoice);
    engine.store_mut().state_mut().set_account(
        heavy.address(),
        Account { balance: 0, stake: 990, nonce: 0 },
    );
    engine.store_mut().state_mut().set_account(
        light.address(),
        Account { balance: 0, stake: 10, nonce: 0 },
    );
    engine
}

#[test]
fn stake_weighted_proposer_selection_matches_the_block_that_gets_accepted() {
    let heavy = Keypair::generate();
    let light = Keypair::generate();

    let candidates = vec![
        Candidate { address: heavy.address(), stake: 990 },
        Candidate { address: light.address(), stake: 10 },
    ];
    // Parent hash for a height-0 block is always the zero hash.
    let winner = select_validator(&chain::BlockHash::zero().0, 0, &candidates).unwrap();
    let winner_kp = if winner == heavy.address() { &heavy } else { &light };
    let loser_kp = if winner == heavy.address() { &light } else { &heavy };

    let mut accepted = enforced_engine(&heavy, &light);
    let mut pool = FixedBatch(Vec::new());
    accepted.propose_block(winner_kp, &mut pool, 1_700_000_000).unwrap();
    assert_eq!(accepted.tip_block().unwrap().header.validator, winner_kp.address());

    let mut rejected = enforced_engine(&heavy, &light);
    let mut pool = FixedBatch(Vec::new());
    let err = rejected
        .propose_block(loser_kp, &mut pool, 1_700_000_000)
        .unwrap_err();
    assert!(matches!(err, chain::ConsensusError::IneligibleValidator));
}

#[test]
fn a_follower_catches_up_via_sync_after_a_partition() {
    let validator = Keypair::generate();
    let mut source = funded_engine(&[]);

    let mut pool = FixedBatch(Vec::new());
    source.propose_block(&validator, &mut pool, 1_700_000_000).unwrap();
    let mut pool = FixedBatch(Vec::new());
    source.propose_block(&validator, &mut pool, 1_700_000_005).unwrap();
    let mut pool = FixedBatch(Vec::new());
    source.propose_block(&validator, &mut pool, 1_700_000_010).unwrap();

    let mut follower = funded_engine(&[]);
    assert!(matches!(
        SyncEngine::request_from(follower.store()),
        Payload::GetBlocksFrom { from_height: 0 }
    ));

    let response = SyncEngine::serve_request(source.store(), 0, 500);
    let blocks = match response {
        Payload::Blocks(blocks) => blocks,
        other => panic!("expected Blocks payload, got {other:?}"),
    };
    assert_eq!(blocks.len(), 3);

    let last_height = SyncEngine::apply_batch(&mut follower, blocks).unwrap();
    assert_eq!(last_height, 2);
    assert_eq!(follower.tip(), source.tip());
}

#[test]
fn gossip_engine_drops_duplicates_and_bans_after_repeated_flooding() {
    let mut engine = GossipEngine::new(GossipConfig {
        rate_limit_burst: 2.0,
        rate_limit_per_sec: 0.0,
        violations_before_ban: 2,
        ..GossipConfig::default()
    });
    let peer = Keypair::generate().address();
    let now = Instant::now();

    let tx = {
        let sender = Keypair::generate();
        transfer(&sender, Keypair::generate().address(), 1, 1, 0, 1_700_000_000)
    };
    let env = Envelope::new(Payload::Tx(tx), 8, 0);

    // Burst of 2 with no refill: the first call spends a token on a new
    // fingerprint, the second spends the last token on a duplicate, and
    // every call after that has no tokens left, tripping the rate
    // limiter until enough violations escalate to a ban.
    assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::Accept);
    assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::Duplicate);
    assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::RateLimited);
    assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::RateLimited);
    assert_eq!(engine.receive(peer, &env, now), ReceiveOutcome::Banned);
    assert!(engine.is_banned(&peer, now));
}

#[test]
fn mempool_transaction_survives_a_relay_hop_and_is_admitted_downstream() {
    let alice = Keypair::generate();
    let tx = transfer(&alice, Keypair::generate().address(), 10, 1, 0, 1_700_000_000);
    let env = Envelope::new(Payload::Tx(tx.clone()), 8, 0);

    let relayed = env.forwarded().expect("ttl not yet exhausted");
    assert_eq!(relayed.hops, 1);

    let mut mempool = Mempool::new(MempoolConfig::default());
    let Payload::Tx(relayed_tx) = relayed.data else {
        panic!("expected a Tx payload");
    };
    let mut state = chain::ChainState::new();
    state.set_account(alice.address(), Account { balance: 1_000, stake: 0, nonce: 0 });
    mempool.admit(relayed_tx, &state).unwrap();
    assert_eq!(mempool.len(), 1);
    assert!(mempool.get(alice.address(), 0).is_some());
}
