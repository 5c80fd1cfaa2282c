//! Peer ring: a bounded, duplicate-free set of known peer endpoints in
//! insertion order, used both for broadcast iteration and round-table
//! membership bookkeeping.
//!
//! Grounded on spec.md §3/§4.6.1 (`NodesRing` in the source's
//! `Structures.hpp`) and SPEC_FULL.md §C.2/C.2a (the new-peer hook and the
//! signal-server port resolution rule).

use std::collections::{HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};

use ringchain_core::NodeId;

pub const PEER_RING_CAPACITY: usize = 500;

pub struct PeerRing {
    capacity: usize,
    members: HashSet<NodeId>,
    order: VecDeque<NodeId>,
    signal_server: Option<SocketAddr>,
    node_port: u16,
}

impl PeerRing {
    pub fn new(capacity: usize, node_port: u16) -> Self {
        PeerRing {
            capacity,
            members: HashSet::new(),
            order: VecDeque::new(),
            signal_server: None,
            node_port,
        }
    }

    pub fn with_signal_server(mut self, signal_server: SocketAddr) -> Self {
        self.signal_server = Some(signal_server);
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    /// Admits `id` to the ring if it isn't already present, evicting the
    /// oldest member on overflow. Returns `true` if this was a genuinely
    /// new peer (in which case `on_new_peer` is the greeting hook).
    pub fn admit(&mut self, id: NodeId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(id);
        self.order.push_back(id);
        self.on_new_peer(id);
        true
    }

    /// The source leaves the greeting send as a stub (empty body) when a
    /// peer is first admitted. We preserve that as a documented no-op
    /// rather than inventing a handshake spec.md never describes
    /// (SPEC_FULL.md §C.2).
    fn on_new_peer(&self, _id: NodeId) {}

    /// Snapshot of the ring's current members in insertion order, for a
    /// broadcast task to target.
    pub fn snapshot(&self) -> Vec<NodeId> {
        self.order.iter().copied().collect()
    }

    /// Resolves a bare peer identity to a socket address: the signal
    /// server's own configured port when the address matches the signal
    /// server, the regular node port otherwise (SPEC_FULL.md §C.2a).
    pub fn resolve(&self, id: NodeId) -> SocketAddr {
        let addr = id.addr();
        if let Some(signal) = self.signal_server {
            if let SocketAddr::V4(v4) = signal {
                if *v4.ip() == addr {
                    return signal;
                }
            }
        }
        SocketAddr::new(std::net::IpAddr::V4(addr), self.node_port)
    }
}
