pub mod amount;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod packet;
pub mod pool;
pub mod transaction;
pub mod user_field;
pub mod varint;

pub use amount::{Amount, AMOUNT_MAX_FRACTION};
pub use crypto::{Ed25519Signature, KeyPair, WriterPublicKey};
pub use error::{CoreError, CoreResult};
pub use identity::{Hash, NodeId, PublicKey, HASH_LEN, PUBLIC_KEY_LEN, PURE_PUBLIC_KEY_TEXT_LEN};
pub use message::Message;
pub use packet::{Command, Packet, Subcommand, MAX_FRAGMENTS, MAX_PAYLOAD, PACKET_LEN};
pub use pool::{Pool, PoolHash, PoolState};
pub use transaction::{Address, Transaction, TransactionId};
pub use user_field::{UserFieldValue, UserFields};
