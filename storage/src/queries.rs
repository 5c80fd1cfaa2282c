//! Read-side chain walks: `pool_load`, `transactions`, `get_from_blockchain`,
//! `get_last_by_source`/`get_last_by_target`. All but `pool_load` walk the
//! chain backward from a starting point via `previous_hash` links.
//!
//! Grounded on spec.md §4.8.4 (`Storage::pool_load`, `transactions`,
//! `get_from_blockchain`, `get_last_by_source/target`).

use ringchain_core::{Address, Pool, PoolHash, Transaction, TransactionId};

use crate::engine::PoolEngine;
use crate::error::{StorageError, StorageResult};

pub fn pool_load<E: PoolEngine + ?Sized>(engine: &E, hash: PoolHash) -> StorageResult<Option<Pool>> {
    match engine.get(&hash.to_binary())? {
        Some(bytes) => {
            let pool = Pool::from_binary(&bytes).map_err(|e| StorageError::DataIntegrity(e.to_string()))?;
            Ok(Some(pool))
        }
        None => Ok(None),
    }
}

/// Where a backward walk begins: either a specific transaction (inclusive)
/// or the tip of the chain.
pub enum WalkStart {
    At(TransactionId),
    Tip,
}

fn starting_pool<E: PoolEngine + ?Sized>(
    engine: &E,
    start: &WalkStart,
    last_hash: Option<PoolHash>,
) -> StorageResult<Option<(PoolHash, Pool, i64)>> {
    let (hash, index) = match start {
        WalkStart::At(id) => (id.pool_hash, id.index as i64),
        WalkStart::Tip => match last_hash {
            Some(h) => (h, -1),
            None => return Ok(None),
        },
    };
    match pool_load(engine, hash)? {
        Some(pool) => {
            let index = if index < 0 { pool.transactions_count() as i64 - 1 } else { index };
            Ok(Some((hash, pool, index)))
        }
        None => Ok(None),
    }
}

/// Walks backward from `start` (or the chain tip if `Tip`), decrementing
/// the transaction index and crossing pool boundaries via `previous_hash`,
/// collecting at most `limit` transactions whose source or target is
/// `addr`. Terminates at the genesis pool or once `limit` is reached.
pub fn transactions<E: PoolEngine + ?Sized>(
    engine: &E,
    addr: &Address,
    limit: usize,
    start: WalkStart,
    last_hash: Option<PoolHash>,
) -> StorageResult<Vec<(TransactionId, Transaction)>> {
    let mut out = Vec::new();
    if limit == 0 {
        return Ok(out);
    }

    let Some((mut pool_hash, mut pool, mut index)) = starting_pool(engine, &start, last_hash)? else {
        return Ok(out);
    };

    loop {
        while index >= 0 {
            let tx = &pool.transactions()[index as usize];
            if &tx.source == addr || &tx.target == addr {
                out.push((TransactionId { pool_hash, index: index as u32 }, tx.clone()));
                if out.len() >= limit {
                    return Ok(out);
                }
            }
            index -= 1;
        }

        match pool_load(engine, pool.previous_hash)? {
            Some(prev) => {
                pool_hash = pool.previous_hash;
                index = prev.transactions_count() as i64 - 1;
                pool = prev;
            }
            None => break,
        }
    }

    Ok(out)
}

/// Same backward walk as `transactions`, stopping at the first transaction
/// whose source is `addr` and whose `inner_id` matches.
pub fn get_from_blockchain<E: PoolEngine + ?Sized>(
    engine: &E,
    addr: &Address,
    inner_id: i64,
    last_hash: Option<PoolHash>,
) -> StorageResult<Option<(TransactionId, Transaction)>> {
    let Some((mut pool_hash, mut pool, mut index)) = starting_pool(engine, &WalkStart::Tip, last_hash)? else {
        return Ok(None);
    };

    loop {
        while index >= 0 {
            let tx = &pool.transactions()[index as usize];
            if &tx.source == addr && tx.inner_id == inner_id {
                return Ok(Some((TransactionId { pool_hash, index: index as u32 }, tx.clone())));
            }
            index -= 1;
        }

        match pool_load(engine, pool.previous_hash)? {
            Some(prev) => {
                pool_hash = pool.previous_hash;
                index = prev.transactions_count() as i64 - 1;
                pool = prev;
            }
            None => return Ok(None),
        }
    }
}

/// Walks pools from `last_hash` backward, asking each in turn for its own
/// highest-insertion-index transaction by `addr` as source.
pub fn get_last_by_source<E: PoolEngine + ?Sized>(
    engine: &E,
    addr: &Address,
    last_hash: Option<PoolHash>,
) -> StorageResult<Option<TransactionId>> {
    walk_last_by(engine, last_hash, |pool| pool.get_last_by_source(addr))
}

pub fn get_last_by_target<E: PoolEngine + ?Sized>(
    engine: &E,
    addr: &Address,
    last_hash: Option<PoolHash>,
) -> StorageResult<Option<TransactionId>> {
    walk_last_by(engine, last_hash, |pool| pool.get_last_by_target(addr))
}

fn walk_last_by<E: PoolEngine + ?Sized>(
    engine: &E,
    last_hash: Option<PoolHash>,
    lookup: impl Fn(&Pool) -> Option<TransactionId>,
) -> StorageResult<Option<TransactionId>> {
    let mut next = last_hash;
    while let Some(hash) = next {
        let Some(pool) = pool_load(engine, hash)? else { break };
        if let Some(found) = lookup(&pool) {
            return Ok(Some(found));
        }
        next = Some(pool.previous_hash);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RedbEngine;
    use ringchain_core::{Amount, KeyPair, Pool, PoolHash, UserFields};

    fn tx(source: u8, target: u8, inner_id: i64) -> Transaction {
        Transaction {
            source: Address::from_bytes([source; 32]),
            target: Address::from_bytes([target; 32]),
            currency: 0,
            amount: Amount::new(1, 0).unwrap(),
            balance: None,
            inner_id,
            user_fields: UserFields::new(),
        }
    }

    fn compose(previous_hash: PoolHash, sequence: u64, txs: Vec<Transaction>, pair: &KeyPair) -> Pool {
        let mut pool = Pool::new(previous_hash, sequence);
        for t in txs {
            pool.add_transaction(t, false).unwrap();
        }
        let sig = pair.sign(&pool.signing_bytes());
        pool.compose(pair.writer_public_key(), sig).unwrap()
    }

    #[test]
    fn transactions_walk_crosses_pool_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();
        let addr = Address::from_bytes([7; 32]);

        let p0 = compose(PoolHash::empty(), 0, vec![tx(7, 1, 1)], &pair);
        let p1 = compose(p0.hash().unwrap(), 1, vec![tx(2, 7, 1), tx(7, 3, 2)], &pair);
        for p in [&p0, &p1] {
            engine.put(&p.hash().unwrap().to_binary(), &p.to_binary().unwrap()).unwrap();
        }

        let found = transactions(&engine, &addr, 10, WalkStart::Tip, p1.hash()).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].1.inner_id, 2);
        assert_eq!(found[2].1.inner_id, 1);
    }

    #[test]
    fn transactions_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();
        let addr = Address::from_bytes([7; 32]);

        let p0 = compose(PoolHash::empty(), 0, vec![tx(7, 1, 1), tx(7, 1, 2), tx(7, 1, 3)], &pair);
        engine.put(&p0.hash().unwrap().to_binary(), &p0.to_binary().unwrap()).unwrap();

        let found = transactions(&engine, &addr, 2, WalkStart::Tip, p0.hash()).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn get_from_blockchain_matches_source_and_inner_id() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();
        let addr = Address::from_bytes([7; 32]);

        let p0 = compose(PoolHash::empty(), 0, vec![tx(7, 1, 5)], &pair);
        engine.put(&p0.hash().unwrap().to_binary(), &p0.to_binary().unwrap()).unwrap();

        let found = get_from_blockchain(&engine, &addr, 5, p0.hash()).unwrap();
        assert!(found.is_some());
        assert!(get_from_blockchain(&engine, &addr, 6, p0.hash()).unwrap().is_none());
    }

    #[test]
    fn get_last_by_source_scans_pools_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();
        let addr = Address::from_bytes([7; 32]);

        let p0 = compose(PoolHash::empty(), 0, vec![tx(7, 1, 1)], &pair);
        let p1 = compose(p0.hash().unwrap(), 1, vec![tx(9, 1, 1)], &pair);
        for p in [&p0, &p1] {
            engine.put(&p.hash().unwrap().to_binary(), &p.to_binary().unwrap()).unwrap();
        }

        let found = get_last_by_source(&engine, &addr, p1.hash()).unwrap().unwrap();
        assert_eq!(found.pool_hash, p0.hash().unwrap());
    }
}
