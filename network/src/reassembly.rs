//! Reassembler: groups fragments by `message_hash` and signals completion.
//!
//! Grounded on spec.md §4.3 (`PacketCollector`/`PacketPart` in the
//! source's `Structures.hpp`).

use std::collections::{HashMap, VecDeque};

use ringchain_core::{Hash, Packet, MAX_PAYLOAD};

use crate::pool::PacketHandle;

pub const REASSEMBLY_CAPACITY: usize = 1000;

pub struct ReassemblyEntry {
    fragments: Vec<Option<PacketHandle>>,
    received: usize,
    total_bytes: usize,
}

impl ReassemblyEntry {
    fn new(fragment_count: usize) -> Self {
        ReassemblyEntry { fragments: vec![None; fragment_count], received: 0, total_bytes: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.fragments.len() - self.received
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Concatenates fragments 0..count-1 into one contiguous payload. Only
    /// meaningful once `is_complete()`.
    pub fn combine(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes);
        for slot in &self.fragments {
            if let Some(handle) = slot {
                out.extend_from_slice(&handle.borrow().payload);
            }
        }
        out
    }
}

pub struct Reassembler {
    capacity: usize,
    order: VecDeque<Hash>,
    table: HashMap<Hash, ReassemblyEntry>,
}

impl Reassembler {
    pub fn new(capacity: usize) -> Self {
        Reassembler { capacity, order: VecDeque::new(), table: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Appends one fragment's packet (already verified to carry
    /// `fragment_count > 0` and `fragment_index < fragment_count` by the
    /// caller). Returns `(accepted, remaining)`: `accepted` is false for a
    /// duplicate fragment index; `remaining == 0` once the message is
    /// complete.
    pub fn append(&mut self, packet: &Packet, handle: PacketHandle) -> (bool, usize) {
        let message_hash = packet.message_hash;
        let fragment_count = packet.fragment_count as usize;
        let fragment_index = packet.fragment_index as usize;
        let payload_len = handle.borrow().payload.len();

        if !self.table.contains_key(&message_hash) {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.table.remove(&oldest);
                }
            }
            self.order.push_back(message_hash);
            self.table.insert(message_hash, ReassemblyEntry::new(fragment_count));
        }

        let entry = self.table.get_mut(&message_hash).expect("just inserted");
        if entry.fragments[fragment_index].is_some() {
            return (false, entry.remaining());
        }
        entry.fragments[fragment_index] = Some(handle);
        entry.received += 1;
        entry.total_bytes += payload_len;
        (true, entry.remaining())
    }

    /// Removes and returns a completed entry so the caller can combine and
    /// dispatch it.
    pub fn take_complete(&mut self, message_hash: &Hash) -> Option<ReassemblyEntry> {
        let is_complete = self.table.get(message_hash).map(|e| e.is_complete()).unwrap_or(false);
        if !is_complete {
            return None;
        }
        self.order.retain(|h| h != message_hash);
        self.table.remove(message_hash)
    }

    /// Expected byte length of a complete reassembled message, per spec.md
    /// §4.3: `(n-1) * MAX_PAYLOAD + size(last fragment)`.
    pub fn expected_len(fragment_count: usize, last_fragment_len: usize) -> usize {
        (fragment_count.saturating_sub(1)) * MAX_PAYLOAD + last_fragment_len
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(REASSEMBLY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PacketPool;
    use ringchain_core::{Command, PublicKey, Subcommand};

    fn fragment(message_hash: Hash, index: u16, count: u16, payload: Vec<u8>) -> Packet {
        Packet {
            command: Command::GetTransaction,
            subcommand: Subcommand::Empty,
            version: 1,
            origin_ip: 0,
            sender_hash: Hash::ZERO,
            sender_public_key: PublicKey::from_bytes([0u8; 32]),
            message_hash,
            fragment_index: index,
            fragment_count: count,
            payload,
        }
    }

    #[test]
    fn completes_after_all_fragments_arrive() {
        let pool = PacketPool::new();
        let mut reassembler = Reassembler::new(10);
        let mh = Hash::blake2s_40(b"msg");

        let p0 = fragment(mh, 0, 2, vec![1, 2, 3]);
        let (accepted, remaining) = reassembler.append(&p0, pool.get_free(p0.clone()));
        assert!(accepted);
        assert_eq!(remaining, 1);
        assert!(reassembler.take_complete(&mh).is_none());

        let p1 = fragment(mh, 1, 2, vec![4, 5]);
        let (accepted, remaining) = reassembler.append(&p1, pool.get_free(p1.clone()));
        assert!(accepted);
        assert_eq!(remaining, 0);

        let entry = reassembler.take_complete(&mh).unwrap();
        assert_eq!(entry.combine(), vec![1, 2, 3, 4, 5]);
        assert!(reassembler.is_empty());
    }

    #[test]
    fn duplicate_fragment_index_is_rejected() {
        let pool = PacketPool::new();
        let mut reassembler = Reassembler::new(10);
        let mh = Hash::blake2s_40(b"msg");
        let p0 = fragment(mh, 0, 2, vec![1]);
        reassembler.append(&p0, pool.get_free(p0.clone()));
        let (accepted, remaining) = reassembler.append(&p0, pool.get_free(p0.clone()));
        assert!(!accepted);
        assert_eq!(remaining, 1);
    }

    #[test]
    fn oldest_in_progress_message_is_evicted_on_overflow() {
        let pool = PacketPool::new();
        let mut reassembler = Reassembler::new(1);
        let first = Hash::blake2s_40(b"first");
        let second = Hash::blake2s_40(b"second");
        let p0 = fragment(first, 0, 2, vec![1]);
        reassembler.append(&p0, pool.get_free(p0.clone()));
        assert_eq!(reassembler.len(), 1);

        let p1 = fragment(second, 0, 2, vec![2]);
        reassembler.append(&p1, pool.get_free(p1.clone()));
        assert_eq!(reassembler.len(), 1);

        // `first` was evicted: its second fragment now looks brand new.
        let p0b = fragment(first, 1, 2, vec![3]);
        let (accepted, remaining) = reassembler.append(&p0b, pool.get_free(p0b.clone()));
        assert!(accepted);
        assert_eq!(remaining, 1);
    }
}
