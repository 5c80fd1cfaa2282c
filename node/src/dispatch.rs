//! Role-gated dispatch: routes a reassembled, replay-checked inbound
//! message to the solver by `(command, subcommand)`, and offers the
//! mirrored role-gated outbound sends. Both sides enforce spec.md
//! §4.6.3's table.
//!
//! Grounded on the `(command, subcommand)` switch in `SessionIO::
//! InputServiceHandleReceive` plus the per-kind methods in `Node.cpp`
//! (`getTransaction`, `getFirstTransaction`, `getVector`, ...).

use std::time::Instant;

use ringchain_core::{Command, Hash as CoreHash, Pool, Subcommand, Transaction};
use ringchain_consensus::{Matrix, Vector};
use ringchain_network::scheduler::TaskId;
use ringchain_network::session::{Delivered, Session};
use tracing::{debug, warn};

use crate::blockchain::Blockchain;
use crate::error::{NodeError, NodeResult};
use crate::role::{read_round_data, Level, Node as RoleNode};
use crate::stats::NodeStats;

/// Ties the role state machine to the transport: every inbound message
/// passes through `dispatch`, every outbound send through one of the
/// `send_*` methods, which enforce spec.md §4.6.3's mirrored precondition
/// before handing off to `Session`.
pub struct Dispatcher {
    pub role: RoleNode,
    pub session: Session,
    pub blockchain: Blockchain,
    pub stats: NodeStats,
}

impl Dispatcher {
    pub fn new(role: RoleNode, session: Session, blockchain: Blockchain) -> Self {
        Dispatcher { role, session, blockchain, stats: NodeStats::default() }
    }

    /// Routes one reassembled message per spec.md §4.6.3. Role-precondition
    /// violations on the inbound side are logged and the message is
    /// dropped, mirroring the outbound policy in spec.md §7 ("violations
    /// ... never abort the process").
    pub async fn dispatch(&mut self, delivered: Delivered) -> NodeResult<()> {
        let Delivered { command, subcommand, sender, payload } = delivered;

        match (command, subcommand) {
            (Command::Redirect, Subcommand::SGetIpTable) => {
                self.handle_round_table(&payload).await?;
            }
            (Command::GetTransaction, _) => {
                if !matches!(self.role.level, Level::Main | Level::Writer) {
                    warn!(level = ?self.role.level, "GetTransaction dropped: not Main or Writer");
                    return Ok(());
                }
                let mut cursor = 0usize;
                while cursor < payload.len() {
                    let (tx, used) = Transaction::read(&payload[cursor..])?;
                    cursor += used;
                    self.role.solver.got_transaction(tx).await;
                }
            }
            (Command::GetFirstTransaction, _) => {
                if self.role.level != Level::Confidant {
                    warn!(level = ?self.role.level, "GetFirstTransaction dropped: not Confidant");
                    return Ok(());
                }
                let (tx, _) = Transaction::read(&payload)?;
                self.role.solver.got_transaction_list(tx).await;
            }
            (Command::GetBlockCandidate, _) => {
                if !matches!(self.role.level, Level::Confidant | Level::Writer) {
                    warn!(level = ?self.role.level, "GetBlockCandidate dropped: not Confidant or Writer");
                    return Ok(());
                }
                let pool = Pool::from_binary(&payload)?;
                self.role.solver.got_block_candidate(pool).await;
            }
            (Command::GetVector, _) => {
                if self.role.level != Level::Confidant {
                    warn!(level = ?self.role.level, "GetVector dropped: not Confidant");
                    return Ok(());
                }
                let (vector, _) = Vector::from_bytes(&payload)?;
                self.role.solver.got_vector(vector, sender).await;
            }
            (Command::GetMatrix, _) => {
                if self.role.level != Level::Confidant {
                    warn!(level = ?self.role.level, "GetMatrix dropped: not Confidant");
                    return Ok(());
                }
                let matrix = Matrix::from_bytes(&payload)?;
                self.role.solver.got_matrix(matrix, sender).await;
            }
            (Command::Redirect, Subcommand::GetBlock) => {
                if self.role.level == Level::Writer {
                    warn!("GetBlock dropped: already Writer");
                    return Ok(());
                }
                let pool = Pool::from_binary(&payload)?;
                self.role.level = Level::Normal;
                self.role.solver.got_block(pool, sender).await;
            }
            (Command::GetHash, _) => {
                if self.role.level != Level::Writer {
                    warn!(level = ?self.role.level, "GetHash dropped: not Writer");
                    return Ok(());
                }
                if payload.len() != ringchain_core::HASH_LEN {
                    return Err(NodeError::Core(ringchain_core::CoreError::Truncated {
                        need: ringchain_core::HASH_LEN,
                        have: payload.len(),
                    }));
                }
                let mut buf = [0u8; ringchain_core::HASH_LEN];
                buf.copy_from_slice(&payload);
                self.role.solver.got_hash(CoreHash::from_bytes(buf), sender).await;
            }
            _ => {
                debug!(?command, ?subcommand, "unhandled (command, subcommand) pair");
            }
        }
        Ok(())
    }

    /// Round table ingestion (spec.md §4.6.1): parses the table, and on
    /// acceptance registers the new composition into the peer ring and
    /// clears every pending retransmission before re-deriving the role.
    /// We pass `tail = true`: once a node is already live, a round-table
    /// broadcast may still carry a refreshed ring-buffer seed, and nothing
    /// in spec.md distinguishes this dispatch path from the registration
    /// handshake's own table on the wire.
    async fn handle_round_table(&mut self, payload: &[u8]) -> NodeResult<()> {
        let table = read_round_data(payload, true)?;
        if !self.role.accept_round_table(&table) {
            return Ok(());
        }
        self.session.peers_mut().admit(table.main_node);
        for confidant in &table.confidants {
            self.session.peers_mut().admit(*confidant);
        }
        for peer in &table.ring_seed {
            self.session.peers_mut().admit(*peer);
        }
        self.session.remove_all_tasks();
        self.role.on_round_start().await;
        self.stats.on_round_start(self.role.round_num);
        Ok(())
    }

    /// Main may not send transactions (spec.md §4.6.3).
    pub fn send_transaction(&mut self, tx: &Transaction, to: ringchain_core::NodeId) -> NodeResult<TaskId> {
        if !self.role.can_send_transaction() {
            warn!(level = ?self.role.level, "send_transaction suppressed: Main may not send transactions");
            return Err(NodeError::RolePrecondition("Main may not send transactions"));
        }
        let mut buf = Vec::new();
        tx.write(&mut buf);
        Ok(self.session.send_direct(Command::GetTransaction, Subcommand::Empty, buf, to, Instant::now())?)
    }

    /// Only Main may send the first-transaction announcement; delivered to
    /// every confidant except self (spec.md §4.6.5).
    pub fn send_first_transaction(&mut self, tx: &Transaction) -> NodeResult<Vec<TaskId>> {
        if !self.role.can_send_first_transaction_or_candidate() {
            warn!(level = ?self.role.level, "send_first_transaction suppressed: only Main may send it");
            return Err(NodeError::RolePrecondition("only Main may send the first-transaction announcement"));
        }
        let mut buf = Vec::new();
        tx.write(&mut buf);
        self.send_by_confidants(Command::GetFirstTransaction, Subcommand::Empty, buf)
    }

    /// Only Main may send the candidate block, to every confidant.
    pub fn send_block_candidate(&mut self, pool: &Pool) -> NodeResult<Vec<TaskId>> {
        if !self.role.can_send_first_transaction_or_candidate() {
            warn!(level = ?self.role.level, "send_block_candidate suppressed: only Main may send it");
            return Err(NodeError::RolePrecondition("only Main may send the candidate block"));
        }
        let buf = pool.to_binary()?;
        self.send_by_confidants(Command::GetBlockCandidate, Subcommand::Empty, buf)
    }

    /// Only a Confidant may send a vector, to the other confidants.
    pub fn send_vector(&mut self, vector: &Vector) -> NodeResult<Vec<TaskId>> {
        if !self.role.can_send_vector_or_matrix() {
            warn!(level = ?self.role.level, "send_vector suppressed: only a Confidant may send it");
            return Err(NodeError::RolePrecondition("only a Confidant may send a vector"));
        }
        self.send_by_confidants(Command::GetVector, Subcommand::Empty, vector.to_bytes())
    }

    /// Only a Confidant may send a matrix, to the other confidants.
    pub fn send_matrix(&mut self, matrix: &Matrix) -> NodeResult<Vec<TaskId>> {
        if !self.role.can_send_vector_or_matrix() {
            warn!(level = ?self.role.level, "send_matrix suppressed: only a Confidant may send it");
            return Err(NodeError::RolePrecondition("only a Confidant may send a matrix"));
        }
        self.send_by_confidants(Command::GetMatrix, Subcommand::Empty, matrix.to_bytes())
    }

    /// Only the Writer may broadcast the committed block.
    pub fn send_block(&mut self, pool: &Pool) -> NodeResult<TaskId> {
        if !self.role.can_send_block() {
            warn!(level = ?self.role.level, "send_block suppressed: only the Writer may send it");
            return Err(NodeError::RolePrecondition("only the Writer may send a block"));
        }
        let buf = pool.to_binary()?;
        Ok(self.session.send_broadcast(Command::Redirect, Subcommand::GetBlock, buf, Instant::now())?)
    }

    /// The Writer must not send hash acknowledgements (it is the
    /// recipient); every other node may send one to the Writer.
    pub fn send_hash(&mut self, hash: CoreHash, to: ringchain_core::NodeId) -> NodeResult<TaskId> {
        if !self.role.can_send_hash() {
            warn!("send_hash suppressed: the Writer must not send hashes");
            return Err(NodeError::RolePrecondition("the Writer must not send hashes"));
        }
        Ok(self.session.send_direct(Command::GetHash, Subcommand::Empty, hash.to_vec(), to, Instant::now())?)
    }

    /// "Send by confidants" (spec.md §4.6.5): sends `payload` to every
    /// confidant except self as a direct task, returning the task ids so a
    /// caller may remove them on the next round transition.
    fn send_by_confidants(&mut self, command: Command, subcommand: Subcommand, payload: Vec<u8>) -> NodeResult<Vec<TaskId>> {
        let now = Instant::now();
        let mut ids = Vec::new();
        for confidant in self.role.other_confidants() {
            ids.push(self.session.send_direct(command, subcommand, payload.clone(), confidant, now)?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringchain_consensus::NullSolver;
    use ringchain_core::NodeId;
    use ringchain_network::session::Identity;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn storage() -> ringchain_storage::Storage {
        let dir = tempfile::tempdir().unwrap();
        ringchain_storage::Storage::open(dir.path().join("pools.redb")).unwrap()
    }

    async fn dispatcher(last: u8) -> Dispatcher {
        let id = NodeId::new(Ipv4Addr::new(127, 0, 0, last));
        let identity = Identity {
            node_id: id,
            public_key: ringchain_core::PublicKey::from_bytes([last; 32]),
            sender_hash: ringchain_core::Hash::blake2s_40(&[last]),
            version: 1,
        };
        let session = Session::bind("127.0.0.1:0".parse().unwrap(), identity, 0, None).await.unwrap();
        let role = RoleNode::new(id, Arc::new(NullSolver::new("test")));
        Dispatcher::new(role, session, Blockchain::new(storage()))
    }

    fn id(last: u8) -> NodeId {
        NodeId::new(Ipv4Addr::new(127, 0, 0, last))
    }

    #[tokio::test]
    async fn main_cannot_send_transaction() {
        let mut d = dispatcher(1).await;
        d.role.main_node = d.role.id;
        d.role.level = Level::Main;
        let tx = sample_tx();
        let err = d.send_transaction(&tx, id(2)).unwrap_err();
        assert!(matches!(err, NodeError::RolePrecondition(_)));
    }

    #[tokio::test]
    async fn writer_cannot_send_hash() {
        let mut d = dispatcher(1).await;
        d.role.level = Level::Writer;
        let err = d.send_hash(ringchain_core::Hash::ZERO, id(2)).unwrap_err();
        assert!(matches!(err, NodeError::RolePrecondition(_)));
    }

    #[tokio::test]
    async fn round_table_dispatch_installs_composition_and_clears_tasks() {
        let mut d = dispatcher(2).await;
        d.session.peers_mut().admit(id(9));
        let queued = d
            .session
            .send_direct(Command::GetHash, Subcommand::Empty, vec![1], id(9), Instant::now())
            .unwrap();
        let _ = queued;

        let table = crate::role::RoundTable {
            round_num: 1,
            main_node: id(1),
            confidants: vec![id(1), id(2), id(3)],
            ring_seed: vec![],
        };
        let payload = crate::role::write_round_data(&table);
        d.dispatch(Delivered { command: Command::Redirect, subcommand: Subcommand::SGetIpTable, sender: id(1), payload })
            .await
            .unwrap();

        assert_eq!(d.role.level, Level::Confidant);
        assert_eq!(d.role.round_num, 1);
    }

    fn sample_tx() -> Transaction {
        Transaction {
            source: ringchain_core::Address::from_bytes([1; 32]),
            target: ringchain_core::Address::from_bytes([2; 32]),
            currency: 0,
            amount: ringchain_core::Amount::new(1, 0).unwrap(),
            balance: None,
            inner_id: 1,
            user_fields: ringchain_core::UserFields::new(),
        }
    }
}
