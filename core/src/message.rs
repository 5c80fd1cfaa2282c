//! A logical message: `command` + `subcommand` + an ordered byte payload,
//! fragmented into `Packet`s bounded by `MAX_PAYLOAD`/`MAX_FRAGMENTS`.
//!
//! Grounded on spec.md §3 ("Message") and §4.5.1 (outbound framing), and
//! `csnode/src/Packstream.cpp`'s `OPackStream` (spans a payload across
//! multiple `Packet` buffers).

use crate::error::{CoreError, CoreResult};
use crate::identity::{Hash, PublicKey};
use crate::packet::{Command, Packet, Subcommand, MAX_FRAGMENTS, MAX_PAYLOAD};

pub struct Message {
    pub command: Command,
    pub subcommand: Subcommand,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(command: Command, subcommand: Subcommand, payload: Vec<u8>) -> Self {
        Message { command, subcommand, payload }
    }

    pub fn fragment_count(&self) -> usize {
        if self.payload.is_empty() {
            1
        } else {
            self.payload.len().div_ceil(MAX_PAYLOAD)
        }
    }

    /// Splits the payload into one `Packet` per fragment, stamping every
    /// fragment with the same header identity fields and `message_hash`
    /// (computed by the caller's message hasher over the first fragment).
    /// `fragment_count` in the wire header is 0 when there is exactly one
    /// fragment, per spec.md §3's invariant.
    pub fn into_packets(
        self,
        version: u8,
        origin_ip: u32,
        sender_hash: Hash,
        sender_public_key: PublicKey,
        message_hash: Hash,
    ) -> CoreResult<Vec<Packet>> {
        let n = self.fragment_count();
        if n > MAX_FRAGMENTS {
            return Err(CoreError::TooManyFragments(n as u16));
        }
        let wire_count = if n == 1 { 0 } else { n as u16 };

        let mut packets = Vec::with_capacity(n);
        for i in 0..n {
            let start = i * MAX_PAYLOAD;
            let end = (start + MAX_PAYLOAD).min(self.payload.len());
            let chunk = self.payload[start..end].to_vec();
            packets.push(Packet {
                command: self.command,
                subcommand: self.subcommand,
                version,
                origin_ip,
                sender_hash,
                sender_public_key,
                message_hash,
                fragment_index: i as u16,
                fragment_count: wire_count,
                payload: chunk,
            });
        }
        Ok(packets)
    }

    /// Concatenates already-ordered fragment payloads back into one
    /// message. The reassembler (network crate) is responsible for
    /// ordering and completeness; this just joins bytes.
    pub fn from_ordered_fragments(
        command: Command,
        subcommand: Subcommand,
        fragments: Vec<Vec<u8>>,
    ) -> Self {
        let payload = fragments.concat();
        Message { command, subcommand, payload }
    }
}
