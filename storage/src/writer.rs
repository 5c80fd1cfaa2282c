//! Single-writer queue: producers enqueue composed pools under a
//! short-held lock; a dedicated thread drains the queue and commits to
//! the key/value engine, decoupling commit latency from callers.
//!
//! Grounded on spec.md §4.8.2/§4.8.3 (`Storage::priv::write_routine`,
//! `pool_save`). The source uses a mutex+condvar+`std::queue`; we use a
//! `std::sync::mpsc` channel, an idiomatic Rust stand-in for the same
//! wait/notify semantics (SPEC_FULL.md grounding ledger, `storage`).

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use ringchain_core::{Pool, PoolHash};
use tracing::{error, warn};

use crate::engine::PoolEngine;

/// Fields the writer thread updates after each commit, shared with the
/// rest of `Storage` under a short-held lock.
#[derive(Default)]
pub struct ChainCursor {
    pub last_hash: Option<PoolHash>,
    pub pool_count: u64,
}

pub struct Writer {
    sender: Sender<Pool>,
    handle: Option<JoinHandle<()>>,
}

impl Writer {
    /// Spawns the writer thread. `engine` is moved into the thread: per
    /// spec.md §5, the key/value engine is exclusively owned by storage,
    /// and all writes go through this single thread.
    pub fn spawn(engine: Arc<dyn PoolEngine>, cursor: Arc<Mutex<ChainCursor>>) -> Self {
        let (sender, receiver): (Sender<Pool>, Receiver<Pool>) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("storage-writer".into())
            .spawn(move || Self::run(engine, cursor, receiver))
            .expect("failed to spawn storage writer thread");
        Writer { sender, handle: Some(handle) }
    }

    /// Enqueues a pool for commit. O(1): the caller never waits on I/O.
    pub fn enqueue(&self, pool: Pool) {
        // The receiver only disconnects once the writer thread has been
        // told to quit via `drop`, at which point no further enqueues are
        // expected; silently dropping here would hide a caller bug, so we
        // log it instead of panicking the I/O thread.
        if self.sender.send(pool).is_err() {
            warn!("storage writer thread is gone; dropping enqueued pool");
        }
    }

    fn run(engine: Arc<dyn PoolEngine>, cursor: Arc<Mutex<ChainCursor>>, receiver: Receiver<Pool>) {
        while let Ok(pool) = receiver.recv() {
            let hash = match pool.hash() {
                Some(h) => h,
                None => {
                    error!("writer received a pool with no hash; dropping");
                    continue;
                }
            };
            let bytes = match pool.to_binary() {
                Ok(b) => b,
                Err(err) => {
                    error!(%err, "failed to serialize pool for commit; dropping");
                    continue;
                }
            };
            if let Err(err) = engine.put(&hash.to_binary(), &bytes) {
                error!(%err, "failed to commit pool to key/value engine");
                continue;
            }

            let mut cursor = cursor.lock().expect("storage cursor poisoned");
            cursor.pool_count += 1;
            // An unset cursor (fresh store) matches a genesis pool's empty
            // previous_hash, mirroring the source's both-empty-strings
            // comparison (spec.md §4.8.2).
            let extends_chain = match cursor.last_hash {
                Some(last) => last == pool.previous_hash,
                None => pool.previous_hash.is_empty(),
            };
            if extends_chain {
                cursor.last_hash = Some(hash);
            }
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; the thread's `recv` loop
        // drains whatever is already queued, then exits on disconnect.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
