//! The role state machine: round-table ingestion, level derivation, and
//! the confidant-broadcast helper.
//!
//! Grounded on `csnode/src/Node.cpp` (`onRoundStart`, `readRoundData`,
//! `becomeWriter`, `initNextRound`, `sendByConfidants`) per spec.md §4.6.

use std::sync::Arc;

use ringchain_consensus::Solver;
use ringchain_core::{CoreError, CoreResult, NodeId};
use tracing::{info, warn};

pub const MIN_CONFIDANTS: usize = 3;
pub const MAX_CONFIDANTS: usize = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Level {
    Normal,
    Confidant,
    Main,
    Writer,
}

/// A parsed round table: who is Main, who are the Confidants, and
/// (optionally) a ring-buffer seed of additional endpoints.
#[derive(Clone, Debug)]
pub struct RoundTable {
    pub round_num: u32,
    pub main_node: NodeId,
    pub confidants: Vec<NodeId>,
    pub ring_seed: Vec<NodeId>,
}

/// Parses a round table per spec.md §4.6.1: `round_num:u32`,
/// `main_node:NodeId`, then up to `MAX_CONFIDANTS` `NodeId`s, then
/// (iff `tail`) a ring-buffer seed consuming the rest of the buffer.
/// `NodeId`s are encoded the same way as a packet's `origin_ip`: 4
/// little-endian bytes.
pub fn read_round_data(buf: &[u8], tail: bool) -> CoreResult<RoundTable> {
    let need = |n: usize, have: usize| CoreError::Truncated { need: n, have };
    let mut cursor = 0usize;

    let round_num = u32::from_le_bytes(
        buf.get(cursor..cursor + 4).ok_or_else(|| need(cursor + 4, buf.len()))?.try_into().unwrap(),
    );
    cursor += 4;

    let main_node = read_node_id(buf, &mut cursor)?;

    let mut confidants = Vec::with_capacity(MAX_CONFIDANTS);
    while confidants.len() < MAX_CONFIDANTS && cursor < buf.len() {
        if buf.len() - cursor < 4 {
            break;
        }
        confidants.push(read_node_id(buf, &mut cursor)?);
    }

    let ring_seed = if tail {
        let mut seed = Vec::new();
        while cursor < buf.len() {
            seed.push(read_node_id(buf, &mut cursor)?);
        }
        seed
    } else {
        if cursor != buf.len() {
            return Err(CoreError::TrailingBytes { remaining: buf.len() - cursor });
        }
        Vec::new()
    };

    Ok(RoundTable { round_num, main_node, confidants, ring_seed })
}

fn read_node_id(buf: &[u8], cursor: &mut usize) -> CoreResult<NodeId> {
    let bytes = buf
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| CoreError::Truncated { need: *cursor + 4, have: buf.len() })?;
    let ip = u32::from_le_bytes(bytes.try_into().unwrap());
    *cursor += 4;
    Ok(NodeId::from_u32(ip))
}

pub fn write_round_data(table: &RoundTable) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&table.round_num.to_le_bytes());
    out.extend_from_slice(&table.main_node.to_u32().to_le_bytes());
    for c in &table.confidants {
        out.extend_from_slice(&c.to_u32().to_le_bytes());
    }
    for r in &table.ring_seed {
        out.extend_from_slice(&r.to_u32().to_le_bytes());
    }
    out
}

/// Per-node role state: round number, level, and current round
/// composition. Owns the `Solver` the role dispatch drives.
pub struct Node {
    pub id: NodeId,
    pub round_num: u32,
    pub level: Level,
    pub main_node: NodeId,
    pub confidants: Vec<NodeId>,
    pub solver: Arc<dyn Solver>,
}

impl Node {
    pub fn new(id: NodeId, solver: Arc<dyn Solver>) -> Self {
        Node { id, round_num: 0, level: Level::Normal, main_node: id, confidants: Vec::new(), solver }
    }

    /// Validates and installs a round table, per spec.md §4.6.1. Returns
    /// `false` (state unchanged) if `new_round <= round_num` or the
    /// confidant set is too small; the caller should neither register
    /// peers nor clear outbound tasks in that case.
    pub fn accept_round_table(&mut self, table: &RoundTable) -> bool {
        if table.round_num <= self.round_num {
            warn!(new_round = table.round_num, current = self.round_num, "stale round table rejected");
            return false;
        }
        if table.confidants.len() < MIN_CONFIDANTS {
            warn!(count = table.confidants.len(), "round table has too few confidants, rejected");
            return false;
        }
        self.round_num = table.round_num;
        self.main_node = table.main_node;
        self.confidants = table.confidants.clone();
        true
    }

    /// Derives this node's level from the installed round composition and
    /// notifies the solver. Call after `accept_round_table` succeeds, or
    /// after `init_next_round` re-installs a composition.
    pub async fn on_round_start(&mut self) {
        self.level = if self.main_node == self.id {
            Level::Main
        } else if self.confidants.contains(&self.id) {
            Level::Confidant
        } else {
            Level::Normal
        };
        info!(round = self.round_num, level = ?self.level, "round started");
        self.solver.next_round().await;
    }

    /// Forces promotion to Writer. Permitted only from Main or Confidant.
    pub fn become_writer(&mut self) {
        match self.level {
            Level::Main | Level::Confidant => {
                self.level = Level::Writer;
                info!("promoted to writer");
            }
            _ => warn!(level = ?self.level, "become_writer called outside Main/Confidant"),
        }
    }

    /// Only the Writer may advance the round. Increments `round_num`,
    /// installs the new composition, and re-derives the level.
    pub async fn init_next_round(&mut self, main_node: NodeId, confidants: Vec<NodeId>) {
        if self.level != Level::Writer {
            warn!(level = ?self.level, "init_next_round called outside Writer");
            return;
        }
        self.round_num += 1;
        self.main_node = main_node;
        self.confidants = confidants;
        self.on_round_start().await;
    }

    pub fn can_send_transaction(&self) -> bool {
        self.level != Level::Main
    }

    pub fn can_send_first_transaction_or_candidate(&self) -> bool {
        self.level == Level::Main
    }

    pub fn can_send_vector_or_matrix(&self) -> bool {
        self.level == Level::Confidant
    }

    pub fn can_send_block(&self) -> bool {
        self.level == Level::Writer
    }

    pub fn can_send_hash(&self) -> bool {
        self.level != Level::Writer
    }

    /// Confidants other than self, for the "send by confidants" helper.
    pub fn other_confidants(&self) -> Vec<NodeId> {
        self.confidants.iter().copied().filter(|c| *c != self.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringchain_consensus::NullSolver;
    use std::net::Ipv4Addr;

    fn id(last: u8) -> NodeId {
        NodeId::new(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn round_table_roundtrips_through_wire_format() {
        let table =
            RoundTable { round_num: 1, main_node: id(1), confidants: vec![id(1), id(2), id(3)], ring_seed: vec![] };
        let bytes = write_round_data(&table);
        let decoded = read_round_data(&bytes, false).unwrap();
        assert_eq!(decoded.round_num, 1);
        assert_eq!(decoded.confidants, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn confidant_stream_stops_at_max_confidants() {
        let table = RoundTable {
            round_num: 1,
            main_node: id(9),
            confidants: vec![id(1), id(2), id(3), id(4)],
            ring_seed: vec![],
        };
        let bytes = write_round_data(&table);
        let err = read_round_data(&bytes, false).unwrap_err();
        assert!(matches!(err, CoreError::TrailingBytes { .. }));
    }

    #[test]
    fn tail_flag_consumes_ring_seed() {
        let table = RoundTable { round_num: 1, main_node: id(9), confidants: vec![id(1), id(2), id(3)], ring_seed: vec![id(5), id(6)] };
        let bytes = write_round_data(&table);
        let decoded = read_round_data(&bytes, true).unwrap();
        assert_eq!(decoded.ring_seed, vec![id(5), id(6)]);
    }

    #[tokio::test]
    async fn round_table_accept_derives_confidant_level() {
        let mut node = Node::new(id(2), Arc::new(NullSolver::new("test")));
        let table =
            RoundTable { round_num: 1, main_node: id(1), confidants: vec![id(1), id(2), id(3)], ring_seed: vec![] };
        assert!(node.accept_round_table(&table));
        node.on_round_start().await;
        assert_eq!(node.level, Level::Confidant);
        assert_eq!(node.main_node, id(1));
        assert_eq!(node.confidants, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn stale_round_is_rejected() {
        let mut node = Node::new(id(2), Arc::new(NullSolver::new("test")));
        node.round_num = 5;
        let table =
            RoundTable { round_num: 5, main_node: id(1), confidants: vec![id(1), id(2), id(3)], ring_seed: vec![] };
        assert!(!node.accept_round_table(&table));
    }

    #[test]
    fn too_few_confidants_is_rejected() {
        let mut node = Node::new(id(2), Arc::new(NullSolver::new("test")));
        let table = RoundTable { round_num: 1, main_node: id(1), confidants: vec![id(1), id(2)], ring_seed: vec![] };
        assert!(!node.accept_round_table(&table));
    }

    #[tokio::test]
    async fn writer_promotion_and_round_advance() {
        let mut node = Node::new(id(2), Arc::new(NullSolver::new("test")));
        let table =
            RoundTable { round_num: 1, main_node: id(1), confidants: vec![id(1), id(2), id(3)], ring_seed: vec![] };
        node.accept_round_table(&table);
        node.on_round_start().await;
        node.become_writer();
        assert_eq!(node.level, Level::Writer);

        node.init_next_round(id(4), vec![id(2), id(4), id(5)]).await;
        assert_eq!(node.round_num, 2);
        assert_eq!(node.level, Level::Confidant);
    }
}
