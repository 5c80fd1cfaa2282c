//! The round/role state machine crate: round-table ingestion, role-gated
//! dispatch, the `Blockchain` facade, and node configuration. Ties
//! together `ringchain-core`, `ringchain-consensus`, `ringchain-network`,
//! `ringchain-storage`, and `ringchain-mempool` into the running node
//! `main.rs` drives.

pub mod blockchain;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod role;
pub mod stats;

pub use blockchain::Blockchain;
pub use dispatch::Dispatcher;
pub use error::{NodeError, NodeResult};
