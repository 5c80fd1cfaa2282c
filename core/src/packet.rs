//! Wire packet framing: the fixed-size UDP datagram record and the
//! command/subcommand enums that tag it.
//!
//! Grounded on `net/include/net/Structures.hpp` (`Packet`, `MAX_PART`) and
//! the header fields enumerated in spec.md §3/§6.

use crate::error::{CoreError, CoreResult};
use crate::identity::{Hash, PublicKey, HASH_LEN, PUBLIC_KEY_LEN};

/// Maximum payload carried by a single fragment.
pub const MAX_PAYLOAD: usize = 62_440;
/// Maximum number of fragments a single logical message may be split into.
pub const MAX_FRAGMENTS: usize = 2048;

pub const HEADER_LEN: usize = 1 + 1 + 1 + 4 + HASH_LEN + PUBLIC_KEY_LEN + HASH_LEN + 2 + 2;
/// Upper bound on the size of one datagram (a full fragment's header plus
/// a full `MAX_PAYLOAD` payload), used to size the receive buffer.
/// Individual fragments shorter than `MAX_PAYLOAD` (always true of the
/// last fragment, and of a single-fragment message) are transmitted at
/// their actual length, not padded up to this bound (spec.md §4.5.1).
pub const PACKET_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Command {
    Registration = 1,
    Redirect = 3,
    GetHash = 4,
    GetTransaction = 7,
    GetVector = 11,
    GetMatrix = 13,
    RegistrationConnectionRefused = 25,
    GetBlockCandidate = 29,
    GetFirstTransaction = 30,
}

impl Command {
    pub fn from_byte(b: u8) -> CoreResult<Self> {
        Ok(match b {
            1 => Command::Registration,
            3 => Command::Redirect,
            4 => Command::GetHash,
            7 => Command::GetTransaction,
            11 => Command::GetVector,
            13 => Command::GetMatrix,
            25 => Command::RegistrationConnectionRefused,
            29 => Command::GetBlockCandidate,
            30 => Command::GetFirstTransaction,
            other => return Err(CoreError::UnknownCommand(other)),
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Subcommand {
    RegistrationLevelNode = 1,
    GetBlock = 3,
    Empty = 5,
    SGetIpTable = 12,
}

impl Subcommand {
    pub fn from_byte(b: u8) -> CoreResult<Self> {
        Ok(match b {
            1 => Subcommand::RegistrationLevelNode,
            3 => Subcommand::GetBlock,
            5 => Subcommand::Empty,
            12 => Subcommand::SGetIpTable,
            other => return Err(CoreError::UnknownSubcommand(other)),
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single fixed-size UDP datagram: header plus a `MAX_PAYLOAD`-byte
/// payload slot. `payload_len` tracks how much of `payload` is meaningful;
/// the rest is padding, mirroring the source's fixed `char data[MAX_PART]`
/// buffer.
#[derive(Clone)]
pub struct Packet {
    pub command: Command,
    pub subcommand: Subcommand,
    pub version: u8,
    pub origin_ip: u32,
    pub sender_hash: Hash,
    pub sender_public_key: PublicKey,
    pub message_hash: Hash,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// `fragment_count == 0` means this packet is the whole message.
    pub fn is_single_fragment(&self) -> bool {
        self.fragment_count == 0
    }

    pub fn total_fragments(&self) -> usize {
        if self.fragment_count == 0 {
            1
        } else {
            self.fragment_count as usize
        }
    }

    /// Serializes the header followed by the payload actually held by
    /// this fragment — `HEADER_LEN + payload.len()` bytes, not padded up
    /// to `PACKET_LEN`. The header carries no explicit payload-length
    /// field, so the datagram's own size is how a receiver learns how
    /// much of it is real data (spec.md §4.5.1: "each fragment sent
    /// header_len + MAX_PAYLOAD except the last which uses header_len +
    /// last_size").
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(CoreError::MalformedPool("payload exceeds MAX_PAYLOAD"));
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.command.as_byte());
        out.push(self.subcommand.as_byte());
        out.push(self.version);
        out.extend_from_slice(&self.origin_ip.to_le_bytes());
        out.extend_from_slice(self.sender_hash.as_bytes());
        out.extend_from_slice(self.sender_public_key.as_bytes());
        out.extend_from_slice(self.message_hash.as_bytes());
        out.extend_from_slice(&self.fragment_index.to_le_bytes());
        out.extend_from_slice(&self.fragment_count.to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn from_bytes(buf: &[u8]) -> CoreResult<Self> {
        if buf.len() < HEADER_LEN {
            return Err(CoreError::Truncated { need: HEADER_LEN, have: buf.len() });
        }
        let mut cursor = 0usize;
        let command = Command::from_byte(buf[cursor])?;
        cursor += 1;
        let subcommand = Subcommand::from_byte(buf[cursor])?;
        cursor += 1;
        let version = buf[cursor];
        cursor += 1;
        let origin_ip = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let mut sender_hash = [0u8; HASH_LEN];
        sender_hash.copy_from_slice(&buf[cursor..cursor + HASH_LEN]);
        cursor += HASH_LEN;
        let mut sender_public_key = [0u8; PUBLIC_KEY_LEN];
        sender_public_key.copy_from_slice(&buf[cursor..cursor + PUBLIC_KEY_LEN]);
        cursor += PUBLIC_KEY_LEN;
        let mut message_hash = [0u8; HASH_LEN];
        message_hash.copy_from_slice(&buf[cursor..cursor + HASH_LEN]);
        cursor += HASH_LEN;
        let fragment_index = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap());
        cursor += 2;
        let fragment_count = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap());
        cursor += 2;

        if fragment_count as usize > MAX_FRAGMENTS {
            return Err(CoreError::TooManyFragments(fragment_count));
        }
        if fragment_count != 0 && fragment_index >= fragment_count {
            return Err(CoreError::FragmentIndexOutOfRange {
                index: fragment_index,
                count: fragment_count,
            });
        }

        let payload = buf[cursor..].to_vec();

        Ok(Packet {
            command,
            subcommand,
            version,
            origin_ip,
            sender_hash: Hash::from_bytes(sender_hash),
            sender_public_key: PublicKey::from_bytes(sender_public_key),
            message_hash: Hash::from_bytes(message_hash),
            fragment_index,
            fragment_count,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet(payload: Vec<u8>) -> Packet {
        Packet {
            command: Command::GetTransaction,
            subcommand: Subcommand::Empty,
            version: 45,
            origin_ip: 0x0100007f,
            sender_hash: Hash::ZERO,
            sender_public_key: PublicKey::from_bytes([7u8; PUBLIC_KEY_LEN]),
            message_hash: Hash::ZERO,
            fragment_index: 0,
            fragment_count: 0,
            payload,
        }
    }

    #[test]
    fn header_roundtrips() {
        let pkt = sample_packet(vec![1, 2, 3]);
        let bytes = pkt.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 3);
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.command, Command::GetTransaction);
        assert_eq!(decoded.version, 45);
        assert!(decoded.is_single_fragment());
        assert_eq!(decoded.payload, vec![1, 2, 3]);
    }

    #[test]
    fn a_full_max_payload_fragment_is_not_padded_further() {
        let pkt = sample_packet(vec![7u8; MAX_PAYLOAD]);
        let bytes = pkt.to_bytes().unwrap();
        assert_eq!(bytes.len(), PACKET_LEN);
    }

    #[test]
    fn rejects_fragment_index_out_of_range() {
        let mut pkt = sample_packet(vec![]);
        pkt.fragment_count = 3;
        pkt.fragment_index = 5;
        let bytes = pkt.to_bytes().unwrap();
        assert!(Packet::from_bytes(&bytes).is_err());
    }

    #[test]
    fn unknown_command_byte_errors() {
        let mut bytes = sample_packet(vec![]).to_bytes().unwrap();
        bytes[0] = 99;
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(CoreError::UnknownCommand(99))
        ));
    }
}
