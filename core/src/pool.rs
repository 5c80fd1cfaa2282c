//! `Pool` (block) and `PoolHash`: an ordered batch of transactions signed
//! by the round's Writer, content-addressed by a hash of its own binary
//! form.
//!
//! Grounded on `csdb_v2/include/csdb/pool.h`. Wire layout per spec.md §6:
//! `previous_hash || sequence:u64 || writer_public_key || transactions
//! (count:varint, then each transaction) || user_fields (count:varint,
//! then each {id:varint, type:u8, value}) || signature`.

use crate::crypto::{Ed25519Signature, WriterPublicKey, SIGNATURE_LEN, WRITER_KEY_LEN};
use crate::error::{CoreError, CoreResult};
use crate::identity::{Hash, HASH_LEN};
use crate::transaction::{Transaction, TransactionId};
use crate::user_field::{read_user_fields, write_user_fields, UserFields};
use crate::varint::{read_u64, write_u64};

/// Opaque content hash of a composed pool's binary form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PoolHash(Hash);

impl PoolHash {
    /// The sentinel "no predecessor" hash a genesis pool's `previous_hash`
    /// carries (spec.md §3: "possibly empty for genesis"). Represented as
    /// the all-zero `Hash`, mirroring `Hash::is_empty`'s existing
    /// zero-sentinel convention rather than introducing a variable-length
    /// byte string for one special case.
    pub fn empty() -> Self {
        PoolHash(Hash::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_hash(h: Hash) -> Self {
        PoolHash(h)
    }

    pub fn as_hash(&self) -> Hash {
        self.0
    }

    pub fn to_binary(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_binary(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != HASH_LEN {
            return Err(CoreError::Truncated { need: HASH_LEN, have: bytes.len() });
        }
        let mut buf = [0u8; HASH_LEN];
        buf.copy_from_slice(bytes);
        Ok(PoolHash(Hash::from_bytes(buf)))
    }

    pub fn calc_from_data(data: &[u8]) -> Self {
        PoolHash(Hash::blake2s_40(data))
    }
}

/// Lifecycle of a `Pool` value: `Mutable` while accepting transactions,
/// `Composed` once hashed/signed (immutable), `Loaded` when reconstructed
/// from storage (also immutable, but without a held signing key).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PoolState {
    Mutable,
    Composed,
    Loaded,
}

#[derive(Clone, Debug)]
pub struct Pool {
    pub previous_hash: PoolHash,
    pub sequence: u64,
    transactions: Vec<Transaction>,
    user_fields: UserFields,
    writer_public_key: Option<WriterPublicKey>,
    signature: Option<Ed25519Signature>,
    state: PoolState,
    hash: Option<PoolHash>,
}

impl Pool {
    pub fn new(previous_hash: PoolHash, sequence: u64) -> Self {
        Pool {
            previous_hash,
            sequence,
            transactions: Vec::new(),
            user_fields: UserFields::new(),
            writer_public_key: None,
            signature: None,
            state: PoolState::Mutable,
            hash: None,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn transactions_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn user_field_ids(&self) -> impl Iterator<Item = &i32> {
        self.user_fields.keys()
    }

    pub fn user_field(&self, id: i32) -> Option<&crate::user_field::UserFieldValue> {
        self.user_fields.get(&id)
    }

    pub fn add_user_field(&mut self, id: i32, value: crate::user_field::UserFieldValue) -> CoreResult<()> {
        if self.state != PoolState::Mutable {
            return Err(CoreError::PoolAlreadyComposed);
        }
        self.user_fields.insert(id, value);
        Ok(())
    }

    /// Rejects the transaction if its source already has an unsigned
    /// pending transaction with the same `inner_id` in this pool, per
    /// spec.md §4.7. `skip_check` mirrors the source's unit-test flag.
    pub fn add_transaction(&mut self, tx: Transaction, skip_check: bool) -> CoreResult<()> {
        if self.state != PoolState::Mutable {
            return Err(CoreError::PoolAlreadyComposed);
        }
        if !skip_check {
            let duplicate = self
                .transactions
                .iter()
                .any(|existing| existing.source == tx.source && existing.inner_id == tx.inner_id);
            if duplicate {
                return Err(CoreError::MalformedTransaction(
                    "source already has a pending transaction with this inner_id",
                ));
            }
        }
        self.transactions.push(tx);
        Ok(())
    }

    /// Freezes the pool: fixes its binary form and derives its hash. A
    /// composed pool accepts no further transactions or user fields.
    /// `writer_public_key`/`signature` are attached by the caller (the
    /// Writer) before or during compose — `compose` itself only requires
    /// they are present.
    pub fn compose(
        mut self,
        writer_public_key: WriterPublicKey,
        signature: Ed25519Signature,
    ) -> CoreResult<Pool> {
        if self.state != PoolState::Mutable {
            return Err(CoreError::PoolAlreadyComposed);
        }
        self.writer_public_key = Some(writer_public_key);
        self.signature = Some(signature);
        self.state = PoolState::Composed;
        let binary = self.to_binary()?;
        self.hash = Some(PoolHash::calc_from_data(&binary));
        Ok(self)
    }

    /// The binary form that should be signed: everything except the
    /// trailing signature field.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_unsigned(&mut out);
        out
    }

    fn write_unsigned(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous_hash.to_binary().as_slice());
        write_u64(out, self.sequence);
        let writer_key = self.writer_public_key.map(|k| *k.as_bytes()).unwrap_or([0u8; WRITER_KEY_LEN]);
        out.extend_from_slice(&writer_key);
        write_u64(out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.write(out);
        }
        write_user_fields(out, &self.user_fields);
    }

    pub fn to_binary(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write_unsigned(&mut out);
        let signature = self.signature.ok_or(CoreError::MalformedPool("pool is not signed"))?;
        out.extend_from_slice(signature.as_bytes());
        Ok(out)
    }

    /// Parses a composed pool's binary form (as written by `to_binary`).
    /// Does not verify the signature; callers that need that call
    /// `verify_signature` explicitly.
    pub fn from_binary(bytes: &[u8]) -> CoreResult<Pool> {
        let mut cursor = 0usize;
        let need = |n: usize, have: usize| CoreError::Truncated { need: n, have };

        let mut prev = [0u8; HASH_LEN];
        prev.copy_from_slice(bytes.get(cursor..cursor + HASH_LEN).ok_or_else(|| need(cursor + HASH_LEN, bytes.len()))?);
        cursor += HASH_LEN;
        let previous_hash = PoolHash(Hash::from_bytes(prev));

        let (sequence, n) = read_u64(&bytes[cursor..])?;
        cursor += n;

        let mut writer_key = [0u8; WRITER_KEY_LEN];
        writer_key.copy_from_slice(
            bytes
                .get(cursor..cursor + WRITER_KEY_LEN)
                .ok_or_else(|| need(cursor + WRITER_KEY_LEN, bytes.len()))?,
        );
        cursor += WRITER_KEY_LEN;

        let (tx_count, n) = read_u64(&bytes[cursor..])?;
        cursor += n;
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let (tx, n) = Transaction::read(&bytes[cursor..])?;
            cursor += n;
            transactions.push(tx);
        }

        let (user_fields, n) = read_user_fields(&bytes[cursor..])?;
        cursor += n;

        let sig_bytes = bytes
            .get(cursor..cursor + SIGNATURE_LEN)
            .ok_or_else(|| need(cursor + SIGNATURE_LEN, bytes.len()))?;
        let mut sig = [0u8; SIGNATURE_LEN];
        sig.copy_from_slice(sig_bytes);
        cursor += SIGNATURE_LEN;

        if cursor != bytes.len() {
            return Err(CoreError::TrailingBytes { remaining: bytes.len() - cursor });
        }

        let hash = PoolHash::calc_from_data(bytes);

        Ok(Pool {
            previous_hash,
            sequence,
            transactions,
            user_fields,
            writer_public_key: Some(WriterPublicKey::from_bytes(writer_key)),
            signature: Some(Ed25519Signature::from_bytes(sig)),
            state: PoolState::Loaded,
            hash: Some(hash),
        })
    }

    /// Decodes the header and transaction count without materializing the
    /// transactions, user fields, or signature that follow. The returned
    /// pool carries `previous_hash`, `sequence`, and `writer_public_key`
    /// only; its `transactions()` is empty regardless of `count`.
    pub fn meta_from_binary(bytes: &[u8]) -> CoreResult<(Pool, u64)> {
        let mut cursor = 0usize;
        let need = |n: usize, have: usize| CoreError::Truncated { need: n, have };

        let mut prev = [0u8; HASH_LEN];
        prev.copy_from_slice(bytes.get(cursor..cursor + HASH_LEN).ok_or_else(|| need(cursor + HASH_LEN, bytes.len()))?);
        cursor += HASH_LEN;
        let previous_hash = PoolHash(Hash::from_bytes(prev));

        let (sequence, n) = read_u64(&bytes[cursor..])?;
        cursor += n;

        let mut writer_key = [0u8; WRITER_KEY_LEN];
        writer_key.copy_from_slice(
            bytes
                .get(cursor..cursor + WRITER_KEY_LEN)
                .ok_or_else(|| need(cursor + WRITER_KEY_LEN, bytes.len()))?,
        );
        cursor += WRITER_KEY_LEN;

        let (count, _) = read_u64(&bytes[cursor..])?;

        let pool = Pool {
            previous_hash,
            sequence,
            transactions: Vec::new(),
            user_fields: UserFields::new(),
            writer_public_key: Some(WriterPublicKey::from_bytes(writer_key)),
            signature: None,
            state: PoolState::Loaded,
            hash: None,
        };
        Ok((pool, count))
    }

    /// Only meaningful once `Composed`/`Loaded`.
    pub fn hash(&self) -> Option<PoolHash> {
        self.hash
    }

    pub fn writer_public_key(&self) -> Option<WriterPublicKey> {
        self.writer_public_key
    }

    pub fn signature(&self) -> Option<Ed25519Signature> {
        self.signature
    }

    pub fn verify_signature(&self) -> bool {
        match (self.writer_public_key, self.signature) {
            (Some(key), Some(sig)) => key.verify(&self.signing_bytes(), &sig),
            _ => false,
        }
    }

    /// Highest-insertion-index transaction whose source matches `addr`.
    pub fn get_last_by_source(&self, addr: &crate::transaction::Address) -> Option<TransactionId> {
        self.transactions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, tx)| &tx.source == addr)
            .map(|(index, _)| TransactionId {
                pool_hash: self.hash.unwrap_or_else(|| PoolHash::calc_from_data(&[])),
                index: index as u32,
            })
    }

    pub fn get_last_by_target(&self, addr: &crate::transaction::Address) -> Option<TransactionId> {
        self.transactions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, tx)| &tx.target == addr)
            .map(|(index, _)| TransactionId {
                pool_hash: self.hash.unwrap_or_else(|| PoolHash::calc_from_data(&[])),
                index: index as u32,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::crypto::KeyPair;
    use crate::transaction::Address;
    use crate::user_field::UserFields;

    fn sample_tx(source: u8, inner_id: i64) -> Transaction {
        Transaction {
            source: Address::from_bytes([source; 32]),
            target: Address::from_bytes([0xaa; 32]),
            currency: 0,
            amount: Amount::new(1, 0).unwrap(),
            balance: None,
            inner_id,
            user_fields: UserFields::new(),
        }
    }

    #[test]
    fn rejects_pending_duplicate_inner_id() {
        let mut pool = Pool::new(PoolHash::calc_from_data(b"genesis"), 1);
        pool.add_transaction(sample_tx(1, 1), false).unwrap();
        let err = pool.add_transaction(sample_tx(1, 1), false).unwrap_err();
        assert_eq!(
            err,
            CoreError::MalformedTransaction("source already has a pending transaction with this inner_id")
        );
    }

    #[test]
    fn skip_check_allows_duplicate() {
        let mut pool = Pool::new(PoolHash::calc_from_data(b"genesis"), 1);
        pool.add_transaction(sample_tx(1, 1), false).unwrap();
        pool.add_transaction(sample_tx(1, 1), true).unwrap();
        assert_eq!(pool.transactions_count(), 2);
    }

    #[test]
    fn compose_then_roundtrip_through_binary() {
        let mut pool = Pool::new(PoolHash::calc_from_data(b"genesis"), 7);
        pool.add_transaction(sample_tx(1, 1), false).unwrap();
        pool.add_transaction(sample_tx(2, 1), false).unwrap();
        let pair = KeyPair::generate();
        let signing_bytes = pool.signing_bytes();
        let signature = pair.sign(&signing_bytes);
        let composed = pool.compose(pair.writer_public_key(), signature).unwrap();
        assert_eq!(composed.state(), PoolState::Composed);
        assert!(composed.verify_signature());

        let binary = composed.to_binary().unwrap();
        let loaded = Pool::from_binary(&binary).unwrap();
        assert_eq!(loaded.sequence, 7);
        assert_eq!(loaded.transactions_count(), 2);
        assert_eq!(loaded.hash(), composed.hash());
        assert!(loaded.verify_signature());
    }

    #[test]
    fn cannot_add_transaction_after_compose() {
        let pool = Pool::new(PoolHash::calc_from_data(b"genesis"), 1);
        let pair = KeyPair::generate();
        let sig = pair.sign(&pool.signing_bytes());
        let mut composed = pool.compose(pair.writer_public_key(), sig).unwrap();
        let err = composed.add_transaction(sample_tx(1, 1), false).unwrap_err();
        assert_eq!(err, CoreError::PoolAlreadyComposed);
    }

    #[test]
    fn meta_from_binary_decodes_header_without_transactions() {
        let mut pool = Pool::new(PoolHash::calc_from_data(b"genesis"), 7);
        pool.add_transaction(sample_tx(1, 1), false).unwrap();
        pool.add_transaction(sample_tx(2, 1), false).unwrap();
        let pair = KeyPair::generate();
        let signing_bytes = pool.signing_bytes();
        let signature = pair.sign(&signing_bytes);
        let composed = pool.compose(pair.writer_public_key(), signature).unwrap();

        let binary = composed.to_binary().unwrap();
        let (meta, count) = Pool::meta_from_binary(&binary).unwrap();
        assert_eq!(count, 2);
        assert_eq!(meta.sequence, 7);
        assert_eq!(meta.previous_hash, composed.previous_hash);
        assert_eq!(meta.transactions_count(), 0);
        assert_eq!(meta.writer_public_key(), Some(pair.writer_public_key()));
    }

    #[test]
    fn get_last_by_source_picks_highest_index() {
        let mut pool = Pool::new(PoolHash::calc_from_data(b"genesis"), 1);
        pool.add_transaction(sample_tx(1, 1), false).unwrap();
        pool.add_transaction(sample_tx(9, 1), false).unwrap();
        pool.add_transaction(sample_tx(1, 2), false).unwrap();
        let addr = Address::from_bytes([1; 32]);
        let found = pool.get_last_by_source(&addr).unwrap();
        assert_eq!(found.index, 2);
    }
}
