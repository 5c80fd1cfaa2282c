//! The `Solver`: the fixed external interface through which the node
//! hands inbound protocol events to the consensus algorithm and receives
//! composed artifacts back. The algorithm itself is an external
//! collaborator, out of scope here — only the call surface is specified.
//!
//! Grounded on the call sites in the source's `Node.cpp`
//! (`solver_->gotTransaction`, `gotVector`, `gotMatrix`, `gotBlock`, ...).
//! `NullSolver` is a reference implementation shaped after the teacher's
//! `Miner` (`consensus/src/miner.rs`): a config struct, `tracing`
//! instrumentation, and async methods — without its NP-hard mining logic,
//! which this module has no counterpart for.

pub mod error;

use async_trait::async_trait;
use ringchain_core::{NodeId, Pool, Transaction};
use tracing::{debug, instrument};

pub use error::{ConsensusError, ConsensusResult};

/// Per-confidant trust/commitment exchanged during a round, before the
/// Writer composes the block. The source's actual vote/commitment
/// algorithm is out of scope; this models the exchange's shape ("a small
/// vector/matrix exchange", spec.md §1), sized to `MAX_CONFIDANTS`.
pub const MAX_CONFIDANTS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vector {
    pub sender: NodeId,
    pub trust: [i8; MAX_CONFIDANTS],
}

impl Vector {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + MAX_CONFIDANTS);
        out.extend_from_slice(&self.sender.to_u32().to_le_bytes());
        for t in self.trust {
            out.push(t as u8);
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> ConsensusResult<(Self, usize)> {
        if buf.len() < 4 + MAX_CONFIDANTS {
            return Err(ConsensusError::Malformed("vector too short"));
        }
        let sender = NodeId::from_u32(u32::from_le_bytes(buf[0..4].try_into().unwrap()));
        let mut trust = [0i8; MAX_CONFIDANTS];
        for (i, slot) in trust.iter_mut().enumerate() {
            *slot = buf[4 + i] as i8;
        }
        Ok((Vector { sender, trust }, 4 + MAX_CONFIDANTS))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix {
    pub rows: Vec<Vector>,
}

impl Matrix {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.rows.len() as u32).to_le_bytes());
        for v in &self.rows {
            out.extend_from_slice(&v.to_bytes());
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> ConsensusResult<Self> {
        if buf.len() < 4 {
            return Err(ConsensusError::Malformed("matrix too short"));
        }
        let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let mut cursor = 4;
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            let (vector, used) = Vector::from_bytes(&buf[cursor..])?;
            cursor += used;
            rows.push(vector);
        }
        Ok(Matrix { rows })
    }
}

/// Call surface the role state machine (`ringchain-node`) drives the
/// consensus algorithm through. Every method corresponds to one inbound
/// event or lifecycle hook in spec.md §4.6.2/§4.6.3.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Invoked by `on_round_start` once the new round's role has been
    /// derived.
    async fn next_round(&self);

    /// A transaction addressed to Main or Writer.
    async fn got_transaction(&self, tx: Transaction);

    /// The first-transaction announcement a Confidant receives.
    async fn got_transaction_list(&self, tx: Transaction);

    /// A candidate block a Confidant or Writer receives for validation.
    async fn got_block_candidate(&self, pool: Pool);

    /// A Confidant's vector, received by every other Confidant.
    async fn got_vector(&self, vector: Vector, sender: NodeId);

    /// A Confidant's matrix, received by every other Confidant.
    async fn got_matrix(&self, matrix: Matrix, sender: NodeId);

    /// A committed block, received by anyone not currently Writer.
    async fn got_block(&self, pool: Pool, sender: NodeId);

    /// A block hash announcement, received only by the Writer.
    async fn got_hash(&self, hash: ringchain_core::Hash, sender: NodeId);
}

/// Deterministic reference `Solver`: logs every call and performs no
/// actual consensus work. Used by the node's own tests and `--dev` runs
/// where no real consensus algorithm is wired in.
#[derive(Default)]
pub struct NullSolver {
    name: String,
}

impl NullSolver {
    pub fn new(name: impl Into<String>) -> Self {
        NullSolver { name: name.into() }
    }
}

#[async_trait]
impl Solver for NullSolver {
    #[instrument(skip(self), fields(solver = %self.name))]
    async fn next_round(&self) {
        debug!("next round");
    }

    #[instrument(skip(self, tx), fields(solver = %self.name))]
    async fn got_transaction(&self, tx: Transaction) {
        debug!(inner_id = tx.inner_id, "got transaction");
    }

    #[instrument(skip(self, tx), fields(solver = %self.name))]
    async fn got_transaction_list(&self, tx: Transaction) {
        debug!(inner_id = tx.inner_id, "got first transaction");
    }

    #[instrument(skip(self, pool), fields(solver = %self.name))]
    async fn got_block_candidate(&self, pool: Pool) {
        debug!(sequence = pool.sequence, "got block candidate");
    }

    #[instrument(skip(self, vector), fields(solver = %self.name))]
    async fn got_vector(&self, vector: Vector, sender: NodeId) {
        let _ = vector;
        debug!(?sender, "got vector");
    }

    #[instrument(skip(self, matrix), fields(solver = %self.name))]
    async fn got_matrix(&self, matrix: Matrix, sender: NodeId) {
        let _ = matrix;
        debug!(?sender, "got matrix");
    }

    #[instrument(skip(self, pool), fields(solver = %self.name))]
    async fn got_block(&self, pool: Pool, sender: NodeId) {
        debug!(sequence = pool.sequence, ?sender, "got block");
    }

    #[instrument(skip(self), fields(solver = %self.name))]
    async fn got_hash(&self, hash: ringchain_core::Hash, sender: NodeId) {
        let _ = hash;
        debug!(?sender, "got hash");
    }
}
