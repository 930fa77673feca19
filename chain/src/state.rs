//! Account bookkeeping: balances, stake, and nonces.
//!
//! The chain's state is a flat map from [`Address`] to [`Account`]. Blocks
//! are applied transaction-by-transaction; every mutation is recorded into
//! an [`Undo`] log so a reorg can roll a block back cleanly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Block, Transaction, TransactionKind};

/// Per-address ledger state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub balance: u64,
    pub stake: u64,
    pub nonce: u64,
}

/// Errors produced while applying a transaction against [`ChainState`].
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum StateError {
    #[error("sender account does not exist")]
    UnknownSender,
    #[error("nonce mismatch: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },
    #[error("insufficient balance to cover amount and fee")]
    InsufficientBalance,
    #[error("unstake amount exceeds the account's current stake")]
    StakeUnderflow,
    #[error("coinbase transaction is malformed")]
    InvalidCoinbase,
}

/// One reversible mutation applied to a single account, used to undo a
/// block's effects during a reorg.
#[derive(Clone, Debug)]
struct AccountDelta {
    address: Address,
    before: Option<Account>,
}

/// Log of account mutations produced by applying a block, in application
/// order. Undoing replays the log in reverse.
#[derive(Clone, Debug, Default)]
pub struct Undo {
    deltas: Vec<AccountDelta>,
}

/// In-memory account ledger.
///
/// `ChainState` is the authoritative view of balances/stake/nonces at the
/// current chain tip. It is deliberately storage-agnostic: callers persist
/// the resulting map through [`crate::storage::ChainStore`] themselves.
#[derive(Clone, Debug, Default)]
pub struct ChainState {
    accounts: HashMap<Address, Account>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    pub fn total_stake(&self) -> u64 {
        self.accounts.values().map(|a| a.stake).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Credits `address` by `amount`, creating the account if needed. Used
    /// for genesis allocation and tests; not part of normal block
    /// application (which goes through [`apply_transaction`]).
    pub fn credit(&mut self, address: Address, amount: u64) {
        let entry = self.accounts.entry(address).or_default();
        entry.balance = entry.balance.saturating_add(amount);
    }

    /// Overwrites an account's full state, bypassing transaction
    /// application. Used by storage backends restoring a persisted
    /// snapshot on startup.
    pub fn set_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    fn set(&mut self, address: Address, account: Account, undo: &mut Undo) {
        let before = self.accounts.insert(address, account);
        undo.deltas.push(AccountDelta { address, before });
    }

    /// Applies a single transaction's effects, recording reversible deltas
    /// into `undo`. Nonce and balance/stake checks are state-dependent and
    /// therefore live here rather than in [`Transaction::verify`].
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        undo: &mut Undo,
    ) -> Result<(), StateError> {
        match tx.kind {
            TransactionKind::Coinbase => {
                let mut recipient = self.get(&tx.recipient);
                recipient.balance = recipient
                    .balance
                    .checked_add(tx.amount)
                    .ok_or(StateError::InvalidCoinbase)?;
                self.set(tx.recipient, recipient, undo);
                Ok(())
            }
            TransactionKind::Transfer => {
                let mut sender = self.get(&tx.sender);
                if sender == Account::default() && !self.accounts.contains_key(&tx.sender) {
                    return Err(StateError::UnknownSender);
                }
                if tx.nonce != sender.nonce {
                    return Err(StateError::BadNonce {
                        expected: sender.nonce,
                        got: tx.nonce,
                    });
                }
                let total = tx
                    .amount
                    .checked_add(tx.fee)
                    .ok_or(StateError::InsufficientBalance)?;
                if sender.balance < total {
                    return Err(StateError::InsufficientBalance);
                }
                sender.balance -= total;
                sender.nonce += 1;
                self.set(tx.sender, sender, undo);

                let mut recipient = self.get(&tx.recipient);
                recipient.balance = recipient.balance.saturating_add(tx.amount);
                self.set(tx.recipient, recipient, undo);
                Ok(())
            }
            TransactionKind::Stake => {
                let mut sender = self.get(&tx.sender);
                if !self.accounts.contains_key(&tx.sender) {
                    return Err(StateError::UnknownSender);
                }
                if tx.nonce != sender.nonce {
                    return Err(StateError::BadNonce {
                        expected: sender.nonce,
                        got: tx.nonce,
                    });
                }
                let total = tx
                    .amount
                    .checked_add(tx.fee)
                    .ok_or(StateError::InsufficientBalance)?;
                if sender.balance < total {
                    return Err(StateError::InsufficientBalance);
                }
                sender.balance -= total;
                sender.stake = sender.stake.saturating_add(tx.amount);
                sender.nonce += 1;
                self.set(tx.sender, sender, undo);
                Ok(())
            }
            TransactionKind::Unstake => {
                let mut sender = self.get(&tx.sender);
                if !self.accounts.contains_key(&tx.sender) {
                    return Err(StateError::UnknownSender);
                }
                if tx.nonce != sender.nonce {
                    return Err(StateError::BadNonce {
                        expected: sender.nonce,
                        got: tx.nonce,
                    });
                }
                if tx.amount > sender.stake {
                    return Err(StateError::StakeUnderflow);
                }
                if sender.balance < tx.fee {
                    return Err(StateError::InsufficientBalance);
                }
                sender.stake -= tx.amount;
                sender.balance = sender.balance.saturating_add(tx.amount) - tx.fee;
                sender.nonce += 1;
                self.set(tx.sender, sender, undo);
                Ok(())
            }
        }
    }

    /// Applies every transaction in `block` in order, returning the undo
    /// log for the whole block. On the first failing transaction, already
    /// applied effects are rolled back and the error is returned.
    pub fn apply_block(&mut self, block: &Block) -> Result<Undo, StateError> {
        let mut undo = Undo::default();
        for tx in &block.txs {
            if let Err(e) = self.apply_transaction(tx, &mut undo) {
                self.undo(undo);
                return Err(e);
            }
        }
        Ok(undo)
    }

    /// Reverses the effects recorded in `undo`, restoring prior account
    /// values (or removing the account if it didn't exist before).
    pub fn undo(&mut self, undo: Undo) {
        for delta in undo.deltas.into_iter().rev() {
            match delta.before {
                Some(account) => {
                    self.accounts.insert(delta.address, account);
                }
                None => {
                    self.accounts.remove(&delta.address);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn transfer(sender: &Keypair, recipient: Address, amount: u64, fee: u64, nonce: u64) -> Transaction {
        let mut tx = Transaction {
            sender: sender.address(),
            recipient,
            amount,
            fee,
            nonce,
            kind: TransactionKind::Transfer,
            data: Vec::new(),
            timestamp: 1_700_000_000,
            public_key: crate::types::PublicKey(Vec::new()),
            signature: crate::types::Signature(Vec::new()),
        };
        tx.sign(sender);
        tx
    }

    #[test]
    fn transfer_moves_balance_and_bumps_nonce() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut state = ChainState::new();
        state.credit(alice.address(), 1_000);

        let tx = transfer(&alice, bob.address(), 100, 1, 0);
        let mut undo = Undo::default();
        state.apply_transaction(&tx, &mut undo).unwrap();

        assert_eq!(state.get(&alice.address()).balance, 899);
        assert_eq!(state.get(&alice.address()).nonce, 1);
        assert_eq!(state.get(&bob.address()).balance, 100);
    }

    #[test]
    fn bad_nonce_is_rejected() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut state = ChainState::new();
        state.credit(alice.address(), 1_000);

        let tx = transfer(&alice, bob.address(), 100, 1, 7);
        let mut undo = Undo::default();
        assert_eq!(
            state.apply_transaction(&tx, &mut undo).unwrap_err(),
            StateError::BadNonce {
                expected: 0,
                got: 7
            }
        );
    }

    #[test]
    fn insufficient_balance_is_rejected() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut state = ChainState::new();
        state.credit(alice.address(), 10);

        let tx = transfer(&alice, bob.address(), 100, 1, 0);
        let mut undo = Undo::default();
        assert_eq!(
            state.apply_transaction(&tx, &mut undo).unwrap_err(),
            StateError::InsufficientBalance
        );
    }

    #[test]
    fn undo_restores_prior_state() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut state = ChainState::new();
        state.credit(alice.address(), 1_000);

        let tx = transfer(&alice, bob.address(), 100, 1, 0);
        let mut undo = Undo::default();
        state.apply_transaction(&tx, &mut undo).unwrap();
        state.undo(undo);

        assert_eq!(state.get(&alice.address()).balance, 1_000);
        assert_eq!(state.get(&alice.address()).nonce, 0);
        assert_eq!(state.get(&bob.address()).balance, 0);
    }

    #[test]
    fn stake_then_unstake_round_trips() {
        let alice = Keypair::generate();
        let mut state = ChainState::new();
        state.credit(alice.address(), 1_000);

        let mut stake_tx = Transaction {
            sender: alice.address(),
            recipient: alice.address(),
            amount: 300,
            fee: 1,
            nonce: 0,
            kind: TransactionKind::Stake,
            data: Vec::new(),
            timestamp: 1_700_000_000,
            public_key: crate::types::PublicKey(Vec::new()),
            signature: crate::types::Signature(Vec::new()),
        };
        stake_tx.sign(&alice);
        let mut undo = Undo::default();
        state.apply_transaction(&stake_tx, &mut undo).unwrap();
        assert_eq!(state.get(&alice.address()).stake, 300);
        assert_eq!(state.get(&alice.address()).balance, 699);

        let mut unstake_tx = Transaction {
            sender: alice.address(),
            recipient: alice.address(),
            amount: 300,
            fee: 1,
            nonce: 1,
            kind: TransactionKind::Unstake,
            data: Vec::new(),
            timestamp: 1_700_000_001,
            public_key: crate::types::PublicKey(Vec::new()),
            signature: crate::types::Signature(Vec::new()),
        };
        unstake_tx.sign(&alice);
        state.apply_transaction(&unstake_tx, &mut undo).unwrap();
        assert_eq!(state.get(&alice.address()).stake, 0);
        assert_eq!(state.get(&alice.address()).balance, 998);
    }

    #[test]
    fn unstake_beyond_current_stake_is_rejected() {
        let alice = Keypair::generate();
        let mut state = ChainState::new();
        state.credit(alice.address(), 1_000);

        let mut unstake_tx = Transaction {
            sender: alice.address(),
            recipient: alice.address(),
            amount: 50,
            fee: 0,
            nonce: 0,
            kind: TransactionKind::Unstake,
            data: Vec::new(),
            timestamp: 1_700_000_000,
            public_key: crate::types::PublicKey(Vec::new()),
            signature: crate::types::Signature(Vec::new()),
        };
        unstake_tx.sign(&alice);
        let mut undo = Undo::default();
        assert_eq!(
            state.apply_transaction(&unstake_tx, &mut undo).unwrap_err(),
            StateError::StakeUnderflow
        );
    }
}
