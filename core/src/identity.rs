//! Node identity: IPv4 address as both endpoint and `NodeId`, the derived
//! `PublicKey` digest, and the 40-byte message-chain `Hash`.
//!
//! Grounded on `net/include/net/Hash.hpp` and `SessionIO::GenerationHash`
//! in `examples/original_source/`.

use std::fmt;
use std::net::Ipv4Addr;

use blake2::{Blake2s256, Digest};

use crate::error::{CoreError, CoreResult};

/// Length of a public-key text file entry, per spec.md §3/§6.
pub const PURE_PUBLIC_KEY_TEXT_LEN: usize = 44;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const HASH_LEN: usize = 40;

/// A node's identity: the IPv4 address it is reachable at. Doubles as an
/// endpoint for direct sends and as the wire `origin_ip` / round-table
/// node identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Ipv4Addr);

impl NodeId {
    pub fn new(addr: Ipv4Addr) -> Self {
        NodeId(addr)
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }

    pub fn to_u32(&self) -> u32 {
        u32::from(self.0)
    }

    pub fn from_u32(v: u32) -> Self {
        NodeId(Ipv4Addr::from(v))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte BLAKE2s digest of a node's 44-character public key text.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Derive a public key digest from the raw key text found in
    /// `PublicKey.txt`. The text must be exactly 44 characters, as the
    /// source enforces by construction (`PURE_PUBLIC_KEY_LENGTH`).
    pub fn from_key_text(text: &str) -> CoreResult<Self> {
        if text.len() != PURE_PUBLIC_KEY_TEXT_LEN {
            return Err(CoreError::BadPublicKeyLength(text.len()));
        }
        let mut hasher = Blake2s256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(&digest);
        Ok(PublicKey(out))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 40-byte message-chain hash. Used both as a node's identity hash (the
/// chain's initial state) and as a fragment's `message_hash`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_LEN]);

    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8; HASH_LEN] {
        &mut self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The node's initial chained hash: BLAKE2s(ip_octets || public_key_text),
    /// zero-padded in the high bytes to fill 40 bytes. Mirrors
    /// `SessionIO::GenerationHash`'s `hsZerosLength` prefix.
    pub fn derive_identity(ip: Ipv4Addr, public_key_text: &str) -> CoreResult<Hash> {
        if public_key_text.len() != PURE_PUBLIC_KEY_TEXT_LEN {
            return Err(CoreError::BadPublicKeyLength(public_key_text.len()));
        }
        let mut buf = Vec::with_capacity(4 + PURE_PUBLIC_KEY_TEXT_LEN);
        buf.extend_from_slice(&ip.octets());
        buf.extend_from_slice(public_key_text.as_bytes());

        let mut hasher = Blake2s256::new();
        hasher.update(&buf);
        let digest = hasher.finalize();

        let mut out = [0u8; HASH_LEN];
        out[HASH_LEN - PUBLIC_KEY_LEN..].copy_from_slice(&digest);
        Ok(Hash(out))
    }

    /// Generic BLAKE2s-256 of arbitrary data, zero-padded into 40 bytes.
    /// Used by `PoolHash::calc_from_data` and content hashing elsewhere.
    pub fn blake2s_40(data: &[u8]) -> Hash {
        let mut hasher = Blake2s256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; HASH_LEN];
        out[HASH_LEN - PUBLIC_KEY_LEN..].copy_from_slice(&digest);
        Hash(out)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_requires_exact_length() {
        assert!(PublicKey::from_key_text("short").is_err());
        let text = "a".repeat(PURE_PUBLIC_KEY_TEXT_LEN);
        assert!(PublicKey::from_key_text(&text).is_ok());
    }

    #[test]
    fn identity_hash_is_deterministic() {
        let ip: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let text = "b".repeat(PURE_PUBLIC_KEY_TEXT_LEN);
        let h1 = Hash::derive_identity(ip, &text).unwrap();
        let h2 = Hash::derive_identity(ip, &text).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, Hash::ZERO);
    }

    #[test]
    fn node_id_roundtrips_through_u32() {
        let id = NodeId::new("192.168.1.42".parse().unwrap());
        assert_eq!(NodeId::from_u32(id.to_u32()), id);
    }
}
