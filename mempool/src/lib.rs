//! Pending-transaction holding area: transactions collected by a Main
//! node between rounds, enforced against the same pending-duplicate rule
//! `Pool::add_transaction` applies, before the round's Writer composes
//! them into a block.
//!
//! Grounded on spec.md §4.7 (the pending-inner-id duplicate check) and
//! shaped after the teacher's `mempool/src/pool.rs` (`PoolConfig`, a
//! stats struct) — simplified to what §4.7 actually asks for: no fee
//! market, no eviction heap, since prioritization is out of scope here.

pub mod error;

use ringchain_core::{Pool, PoolHash, Transaction};
use tracing::{debug, warn};

pub use error::{MempoolError, MempoolResult};

/// Bounds on the holding area. Unlike the teacher's `PoolConfig` (byte and
/// fee-weighted caps), this only needs a transaction-count ceiling: the
/// round table caps how much a Main node gathers before handing off.
#[derive(Clone, Debug)]
pub struct MempoolConfig {
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig { max_transactions: 10_000 }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MempoolStats {
    pub accepted: u64,
    pub rejected_duplicate: u64,
    pub rejected_full: u64,
}

/// Holds a single round's worth of transactions inside a `Mutable` pool,
/// as the Main node receives them one at a time from the Transport layer.
pub struct Mempool {
    config: MempoolConfig,
    pool: Pool,
    stats: MempoolStats,
}

impl Mempool {
    pub fn new(config: MempoolConfig, previous_hash: PoolHash, sequence: u64) -> Self {
        Mempool { config, pool: Pool::new(previous_hash, sequence), stats: MempoolStats::default() }
    }

    /// Accepts a transaction into the round's pool, applying the same
    /// pending-inner_id-duplicate rule as `Pool::add_transaction`
    /// (skip_check is never set here: that flag exists only for tests).
    pub fn add_transaction(&mut self, tx: Transaction) -> MempoolResult<()> {
        if self.pool.transactions_count() >= self.config.max_transactions {
            self.stats.rejected_full += 1;
            warn!(max = self.config.max_transactions, "mempool full, rejecting transaction");
            return Err(MempoolError::Full);
        }
        match self.pool.add_transaction(tx, false) {
            Ok(()) => {
                self.stats.accepted += 1;
                debug!(count = self.pool.transactions_count(), "transaction accepted into mempool");
                Ok(())
            }
            Err(err) => {
                self.stats.rejected_duplicate += 1;
                Err(MempoolError::Core(err))
            }
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.pool.transactions()
    }

    pub fn len(&self) -> usize {
        self.pool.transactions_count()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.transactions_count() == 0
    }

    pub fn stats(&self) -> MempoolStats {
        self.stats
    }

    /// Hands the accumulated pool to the caller (the Writer, to compose
    /// and persist) and resets the holding area for the next round.
    pub fn take(&mut self, previous_hash: PoolHash, sequence: u64) -> Pool {
        let stats = self.stats;
        let taken = std::mem::replace(&mut self.pool, Pool::new(previous_hash, sequence));
        self.stats = MempoolStats::default();
        debug!(accepted = stats.accepted, "mempool handed off to writer");
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringchain_core::{Address, Amount, UserFields};

    fn tx(source: u8, inner_id: i64) -> Transaction {
        Transaction {
            source: Address::from_bytes([source; 32]),
            target: Address::from_bytes([0xaa; 32]),
            currency: 0,
            amount: Amount::new(1, 0).unwrap(),
            balance: None,
            inner_id,
            user_fields: UserFields::new(),
        }
    }

    #[test]
    fn accepts_distinct_transactions() {
        let mut mempool = Mempool::new(MempoolConfig::default(), PoolHash::empty(), 0);
        mempool.add_transaction(tx(1, 1)).unwrap();
        mempool.add_transaction(tx(2, 1)).unwrap();
        assert_eq!(mempool.len(), 2);
        assert_eq!(mempool.stats().accepted, 2);
    }

    #[test]
    fn rejects_pending_duplicate_inner_id() {
        let mut mempool = Mempool::new(MempoolConfig::default(), PoolHash::empty(), 0);
        mempool.add_transaction(tx(1, 1)).unwrap();
        let err = mempool.add_transaction(tx(1, 1)).unwrap_err();
        assert!(matches!(err, MempoolError::Core(_)));
        assert_eq!(mempool.stats().rejected_duplicate, 1);
    }

    #[test]
    fn rejects_once_full() {
        let mut mempool = Mempool::new(MempoolConfig { max_transactions: 1 }, PoolHash::empty(), 0);
        mempool.add_transaction(tx(1, 1)).unwrap();
        let err = mempool.add_transaction(tx(2, 1)).unwrap_err();
        assert!(matches!(err, MempoolError::Full));
    }

    #[test]
    fn take_resets_for_next_round() {
        let mut mempool = Mempool::new(MempoolConfig::default(), PoolHash::empty(), 0);
        mempool.add_transaction(tx(1, 1)).unwrap();
        let pool = mempool.take(PoolHash::calc_from_data(b"next"), 1);
        assert_eq!(pool.transactions_count(), 1);
        assert!(mempool.is_empty());
        assert_eq!(mempool.stats().accepted, 0);
    }
}
