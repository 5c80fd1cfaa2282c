//! Ed25519 signing for pool writer signatures.
//!
//! Distinct from `identity::PublicKey` (the BLAKE2s-derived node identity
//! used on the wire): this is the writer's actual signing keypair, carried
//! in `Pool::writer_public_key`/`Pool::signature`.
//!
//! Grounded on the teacher's `core/src/crypto.rs` (`KeyPair`,
//! `Ed25519Signature`), re-pointed at pool signing instead of per-tx
//! signing.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

pub const WRITER_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut csprng);
        KeyPair { signing_key }
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let signature = self.signing_key.sign(message);
        Ed25519Signature(signature.to_bytes())
    }

    pub fn writer_public_key(&self) -> WriterPublicKey {
        WriterPublicKey(self.signing_key.verifying_key().to_bytes())
    }
}

/// The writer's Ed25519 public key, stored verbatim in a composed `Pool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterPublicKey([u8; WRITER_KEY_LEN]);

impl WriterPublicKey {
    pub fn from_bytes(bytes: [u8; WRITER_KEY_LEN]) -> Self {
        WriterPublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; WRITER_KEY_LEN] {
        &self.0
    }

    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> bool {
        match VerifyingKey::from_bytes(&self.0) {
            Ok(verifying_key) => {
                let sig = Signature::from_bytes(&signature.0);
                verifying_key.verify(message, &sig).is_ok()
            }
            Err(_) => false,
        }
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; SIGNATURE_LEN]);

impl Ed25519Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Ed25519Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_against_matching_key() {
        let pair = KeyPair::generate();
        let sig = pair.sign(b"pool bytes");
        assert!(pair.writer_public_key().verify(b"pool bytes", &sig));
    }

    #[test]
    fn signature_fails_on_tampered_message() {
        let pair = KeyPair::generate();
        let sig = pair.sign(b"pool bytes");
        assert!(!pair.writer_public_key().verify(b"other bytes", &sig));
    }
}
