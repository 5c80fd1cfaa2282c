//! Tagged user-field values attachable to a `Transaction` or `Pool`,
//! keyed by a small integer id.
//!
//! Grounded on `csdb_v2/include/csdb/user_field.h` (`UserField::Type`).

use std::collections::BTreeMap;

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};
use crate::varint::{read_bytes, read_u32, read_u64, write_bytes, write_u32, write_u64};

const TAG_INTEGER: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_AMOUNT: u8 = 3;

#[derive(Clone, PartialEq, Debug)]
pub enum UserFieldValue {
    Integer(i64),
    String(String),
    Amount(Amount),
}

impl UserFieldValue {
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            UserFieldValue::Integer(v) => {
                out.push(TAG_INTEGER);
                write_u64(out, *v as u64);
            }
            UserFieldValue::String(s) => {
                out.push(TAG_STRING);
                write_bytes(out, s.as_bytes());
            }
            UserFieldValue::Amount(a) => {
                out.push(TAG_AMOUNT);
                write_u32(out, a.integral() as u32);
                write_u64(out, a.fraction());
            }
        }
    }

    pub fn read(buf: &[u8]) -> CoreResult<(Self, usize)> {
        let tag = *buf.get(0).ok_or(CoreError::Truncated { need: 1, have: 0 })?;
        let rest = &buf[1..];
        let (value, len) = match tag {
            TAG_INTEGER => {
                let (v, n) = read_u64(rest)?;
                (UserFieldValue::Integer(v as i64), n)
            }
            TAG_STRING => {
                let (bytes, n) = read_bytes(rest)?;
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|_| CoreError::MalformedTransaction("user field string is not utf8"))?;
                (UserFieldValue::String(s), n)
            }
            TAG_AMOUNT => {
                let (integral, n1) = read_u32(rest)?;
                let (fraction, n2) = read_u64(&rest[n1..])?;
                let amount = Amount::new(integral as i32, fraction)?;
                (UserFieldValue::Amount(amount), n1 + n2)
            }
            other => return Err(CoreError::UnknownUserFieldType(other)),
        };
        Ok((value, len + 1))
    }
}

/// Map of user-field id to value, ordered by id for deterministic
/// serialization.
pub type UserFields = BTreeMap<i32, UserFieldValue>;

pub fn write_user_fields(out: &mut Vec<u8>, fields: &UserFields) {
    write_u32(out, fields.len() as u32);
    for (id, value) in fields {
        write_u32(out, *id as u32);
        value.write(out);
    }
}

pub fn read_user_fields(buf: &[u8]) -> CoreResult<(UserFields, usize)> {
    let mut cursor = 0usize;
    let (count, n) = read_u32(buf)?;
    cursor += n;
    let mut fields = UserFields::new();
    for _ in 0..count {
        let (id, n) = read_u32(&buf[cursor..])?;
        cursor += n;
        let (value, n) = UserFieldValue::read(&buf[cursor..])?;
        cursor += n;
        fields.insert(id as i32, value);
    }
    Ok((fields, cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_field_roundtrips() {
        let mut buf = Vec::new();
        UserFieldValue::Integer(-7).write(&mut buf);
        let (v, len) = UserFieldValue::read(&buf).unwrap();
        assert_eq!(v, UserFieldValue::Integer(-7));
        assert_eq!(len, buf.len());
    }

    #[test]
    fn string_field_roundtrips() {
        let mut buf = Vec::new();
        UserFieldValue::String("node-tag".into()).write(&mut buf);
        let (v, _) = UserFieldValue::read(&buf).unwrap();
        assert_eq!(v, UserFieldValue::String("node-tag".into()));
    }

    #[test]
    fn fields_map_roundtrips_in_id_order() {
        let mut fields = UserFields::new();
        fields.insert(2, UserFieldValue::Integer(1));
        fields.insert(1, UserFieldValue::String("a".into()));
        let mut buf = Vec::new();
        write_user_fields(&mut buf, &fields);
        let (decoded, len) = read_user_fields(&buf).unwrap();
        assert_eq!(decoded, fields);
        assert_eq!(len, buf.len());
    }
}
