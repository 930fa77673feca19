//! Deterministic, stake-weighted validator selection.
//!
//! Every node must agree on who is entitled to propose the next block
//! without any out-of-band coordination. The lottery is deterministic: a
//! pseudo-random target in `[0, total_stake)` is derived from
//! `SHA-256(seed ∥ height)`, where `seed` is the hash of the previous
//! block, and the validator whose cumulative stake range contains that
//! target wins. Height is folded into the digest so that replaying the
//! same seed at a different height (e.g. after a stalled proposer is
//! skipped) does not reselect the same validator. Because the input and
//! the stake table are both part of consensus state, every honest node
//! computes the same winner.

use crate::types::{Address, Hash256};

/// One eligible validator and its current stake.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub address: Address,
    pub stake: u64,
}

/// Selects the validator entitled to propose the block at `height`, given
/// the hash of the parent block and the current stake table.
///
/// Candidates are sorted by address (a total order on [`Address`]) before
/// the cumulative-stake walk so the result does not depend on iteration
/// order over a `HashMap`. Returns `None` if there are no eligible
/// candidates or the total stake is zero.
pub fn select_validator(parent_hash: &Hash256, height: u64, candidates: &[Candidate]) -> Option<Address> {
    let total_stake: u64 = candidates.iter().map(|c| c.stake).sum();
    if total_stake == 0 {
        return None;
    }

    let mut sorted: Vec<Candidate> = candidates.to_vec();
    sorted.sort_by_key(|c| c.address);

    let mut preimage = Vec::with_capacity(32 + 8);
    preimage.extend_from_slice(parent_hash.as_bytes());
    preimage.extend_from_slice(&height.to_be_bytes());
    let digest = Hash256::compute(&preimage);
    let mut target_bytes = [0u8; 8];
    target_bytes.copy_from_slice(&digest.as_bytes()[..8]);
    let target = u64::from_be_bytes(target_bytes) % total_stake;

    let mut cumulative: u64 = 0;
    for candidate in sorted {
        cumulative += candidate.stake;
        if target < cumulative {
            return Some(candidate.address);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn selection_is_deterministic_for_same_inputs() {
        let a = Keypair::generate().address();
        let b = Keypair::generate().address();
        let candidates = vec![
            Candidate { address: a, stake: 10 },
            Candidate { address: b, stake: 90 },
        ];
        let seed = Hash256::compute(b"parent block");

        let first = select_validator(&seed, 7, &candidates);
        let second = select_validator(&seed, 7, &candidates);
        assert_eq!(first, second);
    }

    #[test]
    fn selection_depends_on_height() {
        let candidates: Vec<Candidate> = (0..8)
            .map(|_| Candidate {
                address: Keypair::generate().address(),
                stake: 1,
            })
            .collect();
        let seed = Hash256::compute(b"parent block");

        let results: std::collections::HashSet<Option<Address>> = (0..16)
            .map(|h| select_validator(&seed, h, &candidates))
            .collect();
        assert!(
            results.len() > 1,
            "selection should vary across heights for a fixed seed"
        );
    }

    #[test]
    fn selection_ignores_candidate_order() {
        let a = Keypair::generate().address();
        let b = Keypair::generate().address();
        let seed = Hash256::compute(b"parent block");

        let forward = vec![
            Candidate { address: a, stake: 30 },
            Candidate { address: b, stake: 70 },
        ];
        let reversed = vec![
            Candidate { address: b, stake: 70 },
            Candidate { address: a, stake: 30 },
        ];

        assert_eq!(
            select_validator(&seed, 5, &forward),
            select_validator(&seed, 5, &reversed)
        );
    }

    #[test]
    fn zero_stake_has_no_winner() {
        let a = Keypair::generate().address();
        let candidates = vec![Candidate { address: a, stake: 0 }];
        let seed = Hash256::compute(b"parent block");
        assert_eq!(select_validator(&seed, 5, &candidates), None);
    }

    #[test]
    fn single_candidate_always_wins() {
        let a = Keypair::generate().address();
        let candidates = vec![Candidate { address: a, stake: 42 }];
        let seed = Hash256::compute(b"any seed");
        assert_eq!(select_validator(&seed, 5, &candidates), Some(a));
    }
}
