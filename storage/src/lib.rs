//! Content-addressed pool storage: an embedded key/value engine, a
//! startup integrity rescan, a single-writer commit queue, and backward
//! chain-walk queries.
//!
//! Grounded on spec.md §4.8 and the teacher's `node/src/chain.rs` (redb
//! usage pattern). Per spec.md §5, storage is the one multi-threaded
//! component in the node: a dedicated writer thread owns the engine for
//! writes, while reads are issued from the caller's thread.

pub mod engine;
pub mod error;
pub mod queries;
pub mod rescan;
pub mod writer;

use std::path::Path;
use std::sync::{Arc, Mutex};

use ringchain_core::{Address, Pool, PoolHash, PoolState, Transaction, TransactionId};
use tracing::{info, warn};

pub use engine::{PoolEngine, RedbEngine};
pub use error::{StorageError, StorageResult};
pub use queries::WalkStart;
pub use rescan::RescanResult;

use writer::{ChainCursor, Writer};

/// Per-instance `(code, message)` recalled via `last_error()`, per
/// spec.md §4.8.5. `NoError` is `None`.
#[derive(Clone, Debug)]
pub struct LastError {
    pub code: &'static str,
    pub message: String,
}

pub struct Storage {
    engine: Arc<dyn PoolEngine>,
    cursor: Arc<Mutex<ChainCursor>>,
    writer: Writer,
    last_error: Mutex<Option<LastError>>,
}

impl Storage {
    /// Opens the key/value engine at `path`, rescans it to reconstruct
    /// `last_hash`/`pool_count`, and spawns the writer thread.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::open_with_progress(path, |_| false)
    }

    pub fn open_with_progress<P: AsRef<Path>>(
        path: P,
        progress: impl FnMut(u64) -> bool,
    ) -> StorageResult<Self> {
        let engine: Arc<dyn PoolEngine> = Arc::new(RedbEngine::open(path)?);
        let result = rescan::rescan(engine.as_ref(), progress)?;
        info!(pool_count = result.pool_count, "storage rescan complete");

        let cursor = Arc::new(Mutex::new(ChainCursor {
            last_hash: result.last_hash,
            pool_count: result.pool_count,
        }));
        let writer = Writer::spawn(engine.clone(), cursor.clone());

        Ok(Storage { engine, cursor, writer, last_error: Mutex::new(None) })
    }

    pub fn last_hash(&self) -> Option<PoolHash> {
        self.cursor.lock().expect("storage cursor poisoned").last_hash
    }

    pub fn pool_count(&self) -> u64 {
        self.cursor.lock().expect("storage cursor poisoned").pool_count
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().expect("last_error poisoned").clone()
    }

    fn set_last_error(&self, code: &'static str, message: impl Into<String>) {
        *self.last_error.lock().expect("last_error poisoned") =
            Some(LastError { code, message: message.into() });
    }

    fn clear_last_error(&self) {
        *self.last_error.lock().expect("last_error poisoned") = None;
    }

    /// Enqueues a composed pool for commit. Rejects with `InvalidParameter`
    /// if the pool isn't composed or is already present under its hash.
    /// A still-`Mutable` pool is rejected rather than composed on its
    /// behalf: composing needs the writer's signing key, which storage
    /// never holds (DESIGN.md open-question resolution).
    pub fn pool_save(&self, pool: Pool) -> StorageResult<()> {
        if pool.state() == PoolState::Mutable {
            let msg = "pool must be composed before it can be saved";
            self.set_last_error("InvalidParameter", msg);
            return Err(StorageError::InvalidParameter(msg.to_string()));
        }
        let hash = match pool.hash() {
            Some(h) => h,
            None => {
                let msg = "composed pool has no hash";
                self.set_last_error("InvalidParameter", msg);
                return Err(StorageError::InvalidParameter(msg.to_string()));
            }
        };
        match self.engine.contains(&hash.to_binary()) {
            Ok(true) => {
                let msg = "pool is already present under its hash";
                self.set_last_error("InvalidParameter", msg);
                return Err(StorageError::InvalidParameter(msg.to_string()));
            }
            Ok(false) => {}
            Err(err) => {
                self.set_last_error("DatabaseError", err.to_string());
                return Err(err);
            }
        }

        self.clear_last_error();
        self.writer.enqueue(pool);
        Ok(())
    }

    pub fn pool_load(&self, hash: PoolHash) -> StorageResult<Option<Pool>> {
        queries::pool_load(self.engine.as_ref(), hash).inspect_err(|err| {
            self.set_last_error("DatabaseError", err.to_string());
        })
    }

    pub fn transactions(
        &self,
        addr: &Address,
        limit: usize,
        start: WalkStart,
    ) -> StorageResult<Vec<(TransactionId, Transaction)>> {
        queries::transactions(self.engine.as_ref(), addr, limit, start, self.last_hash())
            .inspect_err(|err| self.set_last_error("ChainError", err.to_string()))
    }

    pub fn get_from_blockchain(
        &self,
        addr: &Address,
        inner_id: i64,
    ) -> StorageResult<Option<(TransactionId, Transaction)>> {
        queries::get_from_blockchain(self.engine.as_ref(), addr, inner_id, self.last_hash())
            .inspect_err(|err| self.set_last_error("ChainError", err.to_string()))
    }

    pub fn get_last_by_source(&self, addr: &Address) -> StorageResult<Option<TransactionId>> {
        queries::get_last_by_source(self.engine.as_ref(), addr, self.last_hash())
            .inspect_err(|err| self.set_last_error("ChainError", err.to_string()))
    }

    pub fn get_last_by_target(&self, addr: &Address) -> StorageResult<Option<TransactionId>> {
        queries::get_last_by_target(self.engine.as_ref(), addr, self.last_hash())
            .inspect_err(|err| self.set_last_error("ChainError", err.to_string()))
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        warn!("storage closing; writer thread will drain its queue before exit");
    }
}
