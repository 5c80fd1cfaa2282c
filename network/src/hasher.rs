//! Per-session message hasher: chains a counter, the sender's public key,
//! and the payload digest into each outbound message's `message_hash`.
//!
//! Grounded on spec.md §4.5.3.

use blake2::{Blake2s256, Digest};

use ringchain_core::{Hash, PublicKey, HASH_LEN};

const COUNTER_LEN: usize = 32;
const KEY_LEN: usize = 32;
const DIGEST_LEN: usize = 32;
const BUFFER_LEN: usize = COUNTER_LEN + KEY_LEN + DIGEST_LEN;

pub struct MessageHasher {
    buffer: [u8; BUFFER_LEN],
}

impl MessageHasher {
    pub fn new(public_key: PublicKey) -> Self {
        let mut buffer = [0u8; BUFFER_LEN];
        buffer[COUNTER_LEN..COUNTER_LEN + KEY_LEN].copy_from_slice(public_key.as_bytes());
        MessageHasher { buffer }
    }

    /// Current value of the little-endian u32 counter at the head of the
    /// buffer, exposed for tests and diagnostics.
    pub fn counter(&self) -> u32 {
        u32::from_le_bytes(self.buffer[0..4].try_into().unwrap())
    }

    /// Produces the next `message_hash` for `payload`, then advances the
    /// internal counter so the next call yields a different hash even for
    /// an identical payload.
    pub fn next_hash(&mut self, payload: &[u8]) -> Hash {
        let mut payload_hasher = Blake2s256::new();
        payload_hasher.update(payload);
        let digest = payload_hasher.finalize();
        self.buffer[COUNTER_LEN + KEY_LEN..].copy_from_slice(&digest);

        let mut buffer_hasher = Blake2s256::new();
        buffer_hasher.update(&self.buffer);
        let buffer_digest = buffer_hasher.finalize();

        let mut out = [0u8; HASH_LEN];
        out[HASH_LEN - DIGEST_LEN..].copy_from_slice(&buffer_digest);

        let counter = self.counter().wrapping_add(1);
        self.buffer[0..4].copy_from_slice(&counter.to_le_bytes());

        Hash::from_bytes(out)
    }
}
