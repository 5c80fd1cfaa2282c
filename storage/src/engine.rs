//! Key/value engine abstraction: the embedded database is an external
//! collaborator (BerkeleyDB in the source) narrowed to an ordered-iteration
//! key→value store, per spec.md §1. `RedbEngine` is the concrete
//! implementation, grounded on the teacher's `node/src/chain.rs`
//! (`redb::Database`, `TableDefinition`).

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StorageResult;

const POOLS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pools");

/// Narrow interface the storage layer needs from its embedded database:
/// get/put by key, existence checks, and ascending key iteration (used by
/// rescan, which processes every persisted pool once at startup).
pub trait PoolEngine: Send + Sync {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;
    fn contains(&self, key: &[u8]) -> StorageResult<bool>;
    fn iter_ascending(&self) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
    fn len(&self) -> StorageResult<u64>;
}

pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let init = db.begin_write()?;
        {
            let _ = init.open_table(POOLS_TABLE)?;
        }
        init.commit()?;
        Ok(RedbEngine { db })
    }
}

impl PoolEngine for RedbEngine {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(POOLS_TABLE)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(POOLS_TABLE)?;
            table.insert(key, value)?;
        }
        write.commit()?;
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        let read = self.db.begin_read()?;
        let table = read.open_table(POOLS_TABLE)?;
        Ok(table.get(key)?.is_some())
    }

    fn iter_ascending(&self) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(POOLS_TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            out.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(out)
    }

    fn len(&self) -> StorageResult<u64> {
        let read = self.db.begin_read()?;
        let table = read.open_table(POOLS_TABLE)?;
        Ok(table.len()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        engine.put(b"key", b"value").unwrap();
        assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(engine.contains(b"key").unwrap());
        assert!(!engine.contains(b"missing").unwrap());
    }

    #[test]
    fn iteration_is_key_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path().join("pools.redb")).unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"c", b"3").unwrap();
        let entries = engine.iter_ascending().unwrap();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(engine.len().unwrap(), 3);
    }
}
