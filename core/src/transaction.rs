//! `Transaction`: source/target addresses, currency, fixed-point amount,
//! optional balance, and tagged user fields. `TransactionID` locates a
//! transaction by the pool it landed in plus its insertion index.
//!
//! Grounded on `csdb_v2/include/csdb/transaction.h`. Wire layout per
//! spec.md §6: `source || target || currency || amount(integral:i32,
//! fraction:u64) || optional balance || user_fields`.

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};
use crate::pool::PoolHash;
use crate::user_field::{read_user_fields, write_user_fields, UserFieldValue, UserFields};
use crate::varint::{read_u32, write_u32};

pub const ADDRESS_LEN: usize = 32;

/// Reserved user-field id carrying `inner_id` on the wire. Spec.md §6's
/// transaction layout has no standalone `inner_id` column — in the source
/// `innerID` rides along as a user field rather than a top-level field, so
/// it is folded into `user_fields` here too rather than added as an extra
/// fixed-width column.
pub const INNER_ID_FIELD: i32 = i32::MIN;

/// A wallet address: the public key (or a derived key hash) identifying a
/// transaction endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

/// Locates a transaction: the pool it was composed into, and its
/// insertion-order index within that pool.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransactionId {
    pub pool_hash: PoolHash,
    pub index: u32,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Transaction {
    pub source: Address,
    pub target: Address,
    pub currency: u32,
    pub amount: Amount,
    pub balance: Option<Amount>,
    /// Per-wallet sequence number; used by the pending-duplicate check
    /// (spec.md §4.7) and by `get_from_blockchain`'s source+inner_id walk.
    pub inner_id: i64,
    pub user_fields: UserFields,
}

impl Transaction {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(self.target.as_bytes());
        write_u32(out, self.currency);
        out.extend_from_slice(&self.amount.integral().to_le_bytes());
        out.extend_from_slice(&self.amount.fraction().to_le_bytes());
        match self.balance {
            Some(b) => {
                out.push(1);
                out.extend_from_slice(&b.integral().to_le_bytes());
                out.extend_from_slice(&b.fraction().to_le_bytes());
            }
            None => out.push(0),
        }
        let mut fields = self.user_fields.clone();
        fields.insert(INNER_ID_FIELD, UserFieldValue::Integer(self.inner_id));
        write_user_fields(out, &fields);
    }

    pub fn read(buf: &[u8]) -> CoreResult<(Self, usize)> {
        let mut cursor = 0usize;
        let need = |n: usize, have: usize| CoreError::Truncated { need: n, have };

        let mut source = [0u8; ADDRESS_LEN];
        source.copy_from_slice(
            buf.get(cursor..cursor + ADDRESS_LEN)
                .ok_or_else(|| need(cursor + ADDRESS_LEN, buf.len()))?,
        );
        cursor += ADDRESS_LEN;

        let mut target = [0u8; ADDRESS_LEN];
        target.copy_from_slice(
            buf.get(cursor..cursor + ADDRESS_LEN)
                .ok_or_else(|| need(cursor + ADDRESS_LEN, buf.len()))?,
        );
        cursor += ADDRESS_LEN;

        let (currency, n) = read_u32(&buf[cursor..])?;
        cursor += n;

        let integral = i32::from_le_bytes(
            buf.get(cursor..cursor + 4)
                .ok_or_else(|| need(cursor + 4, buf.len()))?
                .try_into()
                .unwrap(),
        );
        cursor += 4;
        let fraction = u64::from_le_bytes(
            buf.get(cursor..cursor + 8)
                .ok_or_else(|| need(cursor + 8, buf.len()))?
                .try_into()
                .unwrap(),
        );
        cursor += 8;
        let amount = Amount::new(integral, fraction)?;

        let has_balance = *buf.get(cursor).ok_or_else(|| need(cursor + 1, buf.len()))?;
        cursor += 1;
        let balance = if has_balance != 0 {
            let integral = i32::from_le_bytes(
                buf.get(cursor..cursor + 4)
                    .ok_or_else(|| need(cursor + 4, buf.len()))?
                    .try_into()
                    .unwrap(),
            );
            cursor += 4;
            let fraction = u64::from_le_bytes(
                buf.get(cursor..cursor + 8)
                    .ok_or_else(|| need(cursor + 8, buf.len()))?
                    .try_into()
                    .unwrap(),
            );
            cursor += 8;
            Some(Amount::new(integral, fraction)?)
        } else {
            None
        };

        let (mut user_fields, n) = read_user_fields(&buf[cursor..])?;
        cursor += n;

        let inner_id = match user_fields.remove(&INNER_ID_FIELD) {
            Some(UserFieldValue::Integer(v)) => v,
            Some(_) => return Err(CoreError::MalformedTransaction("inner_id field has the wrong type")),
            None => return Err(CoreError::MalformedTransaction("transaction is missing its inner_id field")),
        };

        Ok((
            Transaction {
                source: Address(source),
                target: Address(target),
                currency,
                amount,
                balance,
                inner_id,
                user_fields,
            },
            cursor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Hash;

    fn sample(inner_id: i64) -> Transaction {
        Transaction {
            source: Address::from_bytes([1u8; ADDRESS_LEN]),
            target: Address::from_bytes([2u8; ADDRESS_LEN]),
            currency: 0,
            amount: Amount::new(5, 0).unwrap(),
            balance: Some(Amount::new(100, 0).unwrap()),
            inner_id,
            user_fields: UserFields::new(),
        }
    }

    #[test]
    fn transaction_roundtrips() {
        let tx = sample(42);
        let mut buf = Vec::new();
        tx.write(&mut buf);
        let (decoded, len) = Transaction::read(&buf).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(len, buf.len());
    }

    #[test]
    fn transaction_without_balance_roundtrips() {
        let mut tx = sample(1);
        tx.balance = None;
        let mut buf = Vec::new();
        tx.write(&mut buf);
        let (decoded, _) = Transaction::read(&buf).unwrap();
        assert_eq!(decoded.balance, None);
    }

    #[test]
    fn negative_inner_id_roundtrips() {
        let tx = sample(-9);
        let mut buf = Vec::new();
        tx.write(&mut buf);
        let (decoded, _) = Transaction::read(&buf).unwrap();
        assert_eq!(decoded.inner_id, -9);
    }

    #[test]
    fn transaction_id_carries_pool_hash_and_index() {
        let id = TransactionId { pool_hash: PoolHash::calc_from_data(b"pool"), index: 3 };
        assert_eq!(id.index, 3);
        assert_ne!(id.pool_hash, PoolHash::calc_from_data(b"other"));
        let _ = Hash::ZERO;
    }
}
