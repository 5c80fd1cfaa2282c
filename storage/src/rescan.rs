//! Startup integrity rescan: walks every persisted pool once, verifies
//! content-addressing, and reconstructs `last_hash`/`pool_count` by
//! finding the longest contiguous chain starting at sequence 0.
//!
//! Grounded on spec.md §4.8.1 (`Storage::priv::rescan` in the source's
//! `csdb/src/storage.cpp`) — the simplified sparse-array/longest-prefix
//! variant spec.md itself describes, not the source's general
//! subchain-splicing algorithm (SPEC_FULL.md §A "storage").

use ringchain_core::{Pool, PoolHash};

use crate::engine::PoolEngine;
use crate::error::{StorageError, StorageResult};

/// One entry recorded per persisted pool, indexed by `sequence`.
#[derive(Clone, Copy)]
struct ChainLink {
    hash: PoolHash,
    previous_hash: PoolHash,
}

pub struct RescanResult {
    pub last_hash: Option<PoolHash>,
    pub pool_count: u64,
}

/// Returning `true` from the progress callback cancels the rescan
/// (`StorageError::UserCancelled`), per spec.md §4.8.1/§7.
pub fn rescan<E: PoolEngine + ?Sized, F: FnMut(u64) -> bool>(engine: &E, mut progress: F) -> StorageResult<RescanResult> {
    let entries = engine.iter_ascending()?;
    let mut by_sequence: Vec<Option<ChainLink>> = Vec::new();
    let mut pool_count: u64 = 0;

    for (key, value) in entries {
        let real_hash = PoolHash::calc_from_data(&value);
        let pool = Pool::from_binary(&value)
            .map_err(|e| StorageError::DataIntegrity(format!("pool failed to decode: {e}")))?;
        let pool_hash = pool
            .hash()
            .ok_or_else(|| StorageError::DataIntegrity("decoded pool has no hash".to_string()))?;

        if pool_hash != real_hash {
            return Err(StorageError::DataIntegrity(
                "pool.hash() does not match calc_from_data(value)".to_string(),
            ));
        }
        if real_hash.to_binary() != key {
            return Err(StorageError::DataIntegrity("stored key does not match pool hash".to_string()));
        }

        let sequence = pool.sequence as usize;
        if by_sequence.len() <= sequence {
            by_sequence.resize(sequence + 1, None);
        }
        by_sequence[sequence] = Some(ChainLink { hash: pool_hash, previous_hash: pool.previous_hash });

        pool_count += 1;
        if progress(pool_count) {
            return Err(StorageError::UserCancelled);
        }
    }

    let last_hash = walk_longest_prefix(&by_sequence);
    Ok(RescanResult { last_hash, pool_count })
}

/// Walks the sparse array from index 0, advancing while each entry's
/// `previous_hash` matches the previous entry's `hash`. Gaps or mismatches
/// truncate the chain silently rather than erroring (spec.md §4.8.1).
fn walk_longest_prefix(by_sequence: &[Option<ChainLink>]) -> Option<PoolHash> {
    let mut last_hash = by_sequence.first().copied().flatten().map(|e| e.hash)?;
    let mut i = 1;
    while let Some(Some(entry)) = by_sequence.get(i) {
        if entry.previous_hash != last_hash {
            break;
        }
        last_hash = entry.hash;
        i += 1;
    }
    Some(last_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RedbEngine;
    use ringchain_core::{KeyPair, Pool, PoolHash};

    fn compose(previous_hash: PoolHash, sequence: u64, pair: &KeyPair) -> Pool {
        let pool = Pool::new(previous_hash, sequence);
        let sig = pair.sign(&pool.signing_bytes());
        pool.compose(pair.writer_public_key(), sig).unwrap()
    }

    #[test]
    fn chains_sequential_pools_from_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();

        let genesis = compose(PoolHash::empty(), 0, &pair);
        let next = compose(genesis.hash().unwrap(), 1, &pair);
        for pool in [&genesis, &next] {
            let bytes = pool.to_binary().unwrap();
            engine.put(&pool.hash().unwrap().to_binary(), &bytes).unwrap();
        }

        let result = rescan(&engine, |_| false).unwrap();
        assert_eq!(result.pool_count, 2);
        assert_eq!(result.last_hash, next.hash());
    }

    #[test]
    fn truncates_at_the_first_gap() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();

        let p0 = compose(PoolHash::empty(), 0, &pair);
        let p1 = compose(p0.hash().unwrap(), 1, &pair);
        let p2 = compose(p1.hash().unwrap(), 2, &pair);
        // p3 deliberately chains to a wrong predecessor; p4 chains to p3.
        let p4 = compose(PoolHash::calc_from_data(b"orphan"), 4, &pair);

        for pool in [&p0, &p1, &p2, &p4] {
            let bytes = pool.to_binary().unwrap();
            engine.put(&pool.hash().unwrap().to_binary(), &bytes).unwrap();
        }

        let result = rescan(&engine, |_| false).unwrap();
        assert_eq!(result.pool_count, 4);
        assert_eq!(result.last_hash, p2.hash());
    }

    #[test]
    fn cancelling_mid_rescan_surfaces_user_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        let pair = KeyPair::generate();
        let p0 = compose(PoolHash::empty(), 0, &pair);
        engine.put(&p0.hash().unwrap().to_binary(), &p0.to_binary().unwrap()).unwrap();

        let err = rescan(&engine, |_| true).unwrap_err();
        assert!(matches!(err, StorageError::UserCancelled));
    }
}
