//! Reliable fragmented datagram transport: packet pooling, replay
//! suppression, reassembly, peer-ring management, retransmission
//! scheduling, and the UDP session that ties them together.
//!
//! Grounded on spec.md §4.1-§4.5 and §5.

pub mod error;
pub mod hasher;
pub mod peers;
pub mod pool;
pub mod reassembly;
pub mod replay;
pub mod scheduler;
pub mod session;

pub use error::{NetworkError, NetworkResult};
pub use hasher::MessageHasher;
pub use peers::{PeerRing, PEER_RING_CAPACITY};
pub use pool::{PacketHandle, PacketPool};
pub use reassembly::{Reassembler, ReassemblyEntry, REASSEMBLY_CAPACITY};
pub use replay::{Fingerprint, ReplaySuppressor, REPLAY_CAPACITY};
pub use scheduler::{Task, TaskId, TaskScheduler, INITIAL_TIMEOUT, MAX_TIMEOUT};
pub use session::{Delivered, Identity, RegistrationOutcome, Session, MAX_REDIRECT, REGISTRATION_RETRY};
