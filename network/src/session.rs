//! Session/Transport: UDP I/O, receive dispatch, outbound framing, and the
//! registration handshake.
//!
//! Grounded on spec.md §4.5 (`SessionIO::InputServiceHandleReceive`,
//! `RunRedirect`, `outFrmPack`, `RegistrationToServer` in the source). The
//! session is single-threaded-cooperative (spec.md §5): every method here
//! is meant to run on one task, driven by the caller's event loop — we
//! don't introduce any locking of our own.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;

use ringchain_core::{Command, Hash, Message, NodeId, Packet, PublicKey, Subcommand, MAX_FRAGMENTS, PACKET_LEN};

use crate::error::{NetworkError, NetworkResult};
use crate::hasher::MessageHasher;
use crate::peers::{PeerRing, PEER_RING_CAPACITY};
use crate::pool::PacketPool;
use crate::reassembly::Reassembler;
use crate::replay::{Fingerprint, ReplaySuppressor};
use crate::scheduler::{TaskId, TaskScheduler};

/// Redirect packets are forwarded (and processed locally) only the first
/// time their fingerprint is seen; any further sighting is a loop.
pub const MAX_REDIRECT: u32 = 1;

/// The fixed registration retry interval while waiting to join a round
/// (spec.md §4.5.5).
pub const REGISTRATION_RETRY: Duration = Duration::from_secs(5);

/// A fully reassembled, replay-checked inbound message ready for the
/// node's role dispatch.
pub struct Delivered {
    pub command: Command,
    pub subcommand: Subcommand,
    pub sender: NodeId,
    pub payload: Vec<u8>,
}

pub enum RegistrationOutcome {
    /// Connected as a plain node; `payload` is the initial round table.
    Connected { round_table: Vec<u8> },
    /// A round is already live; `payload` is the round table to ingest.
    RoundInProgress { round_table: Vec<u8> },
    Refused,
}

pub struct Identity {
    pub node_id: NodeId,
    pub public_key: PublicKey,
    pub sender_hash: Hash,
    pub version: u8,
}

pub struct Session {
    socket: UdpSocket,
    identity: Identity,
    pool: PacketPool,
    replay: ReplaySuppressor,
    reassembler: Reassembler,
    peers: PeerRing,
    scheduler: TaskScheduler,
    hasher: MessageHasher,
}

impl Session {
    pub async fn bind(
        bind_addr: SocketAddr,
        identity: Identity,
        node_port: u16,
        signal_server: Option<SocketAddr>,
    ) -> NetworkResult<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let mut peers = PeerRing::new(PEER_RING_CAPACITY, node_port);
        if let Some(signal) = signal_server {
            peers = peers.with_signal_server(signal);
        }
        let hasher = MessageHasher::new(identity.public_key);
        Ok(Session {
            socket,
            identity,
            pool: PacketPool::new(),
            replay: ReplaySuppressor::default(),
            reassembler: Reassembler::default(),
            peers,
            scheduler: TaskScheduler::new(),
            hasher,
        })
    }

    pub fn peers(&self) -> &PeerRing {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerRing {
        &mut self.peers
    }

    pub fn node_id(&self) -> NodeId {
        self.identity.node_id
    }

    pub fn remove_task(&mut self, id: TaskId) {
        self.scheduler.remove(id);
    }

    /// Abandons every pending retransmission. Called on round transitions.
    pub fn remove_all_tasks(&mut self) {
        self.scheduler.remove_all();
    }

    fn build_packets(&mut self, command: Command, subcommand: Subcommand, payload: Vec<u8>) -> NetworkResult<Vec<Packet>> {
        let message = Message::new(command, subcommand, payload);
        let fragment_count = message.fragment_count();
        let hash_input_len = if fragment_count == 1 {
            message.payload.len()
        } else {
            ringchain_core::MAX_PAYLOAD
        };
        let message_hash = self.hasher.next_hash(&message.payload[..hash_input_len.min(message.payload.len())]);
        let packets = message.into_packets(
            self.identity.version,
            self.identity.node_id.to_u32(),
            self.identity.sender_hash,
            self.identity.public_key,
            message_hash,
        )?;
        Ok(packets)
    }

    /// Enqueues a message addressed to a single endpoint as a direct task.
    pub fn send_direct(
        &mut self,
        command: Command,
        subcommand: Subcommand,
        payload: Vec<u8>,
        to: NodeId,
        now: Instant,
    ) -> NetworkResult<TaskId> {
        let packets = self.build_packets(command, subcommand, payload)?;
        let receiver = self.peers.resolve(to);
        Ok(self.enqueue(packets, vec![receiver], false, now))
    }

    /// Enqueues a message to every peer currently in the ring, snapshot at
    /// enqueue time (spec.md §5, "Shared resources").
    pub fn send_broadcast(
        &mut self,
        command: Command,
        subcommand: Subcommand,
        payload: Vec<u8>,
        now: Instant,
    ) -> NetworkResult<TaskId> {
        let packets = self.build_packets(command, subcommand, payload)?;
        let receivers = self.peers.snapshot().into_iter().map(|id| self.peers.resolve(id)).collect();
        Ok(self.enqueue(packets, receivers, true, now))
    }

    fn enqueue(&mut self, packets: Vec<Packet>, receivers: Vec<SocketAddr>, broadcast: bool, now: Instant) -> TaskId {
        let last_len = packets.last().map(|p| p.payload.len()).unwrap_or(0);
        let handles = packets.into_iter().map(|p| self.pool.get_free(p)).collect();
        self.scheduler.add(handles, last_len, receivers, broadcast, now)
    }

    /// Sends every fragment of every task whose retransmission is due.
    pub async fn flush_due(&mut self, now: Instant) -> NetworkResult<()> {
        let mut outbound: Vec<(Vec<u8>, SocketAddr)> = Vec::new();
        self.scheduler.run(now, |task| {
            for handle in &task.fragments {
                let bytes = match handle.borrow().to_bytes() {
                    Ok(b) => b,
                    Err(_) => continue,
                };
                for receiver in &task.receivers {
                    outbound.push((bytes.clone(), *receiver));
                }
            }
        });
        for (bytes, addr) in outbound {
            self.socket.send_to(&bytes, addr).await?;
        }
        Ok(())
    }

    /// Applies redirect-forwarding to a received redirect packet: bumps
    /// the fingerprint's replay count, and if this is the first sighting,
    /// rewrites the sender identity fields and re-sends the packet to
    /// every ring member. Returns whether the caller should process the
    /// packet locally, per spec.md §4.5.4.
    async fn forward_redirect(&mut self, packet: &mut Packet) -> NetworkResult<bool> {
        let fp = Fingerprint::of_packet(packet);
        let count = self.replay.push_and_increase(fp);
        if count > MAX_REDIRECT {
            return Ok(false);
        }
        packet.sender_hash = self.identity.sender_hash;
        packet.sender_public_key = self.identity.public_key;
        let bytes = packet.to_bytes()?;
        for peer in self.peers.snapshot() {
            let addr = self.peers.resolve(peer);
            self.socket.send_to(&bytes, addr).await?;
        }
        Ok(count == 1)
    }

    /// Receives one datagram and drives it through fragmentation,
    /// redirect forwarding, and replay suppression. Returns `Ok(None)`
    /// when the packet was consumed but nothing is ready for the node yet
    /// (an in-progress fragment, a suppressed duplicate, or a redirect
    /// that only needed forwarding).
    pub async fn recv_dispatch(&mut self) -> NetworkResult<Option<Delivered>> {
        let mut buf = vec![0u8; PACKET_LEN];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        let sender_addr = match from.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => return Ok(None),
        };

        let mut packet = match Packet::from_bytes(&buf[..n]) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };

        let sender = NodeId::new(sender_addr);
        self.peers.admit(sender);

        if packet.fragment_count > 0 {
            if packet.fragment_count as usize > MAX_FRAGMENTS || packet.fragment_index >= packet.fragment_count {
                return Ok(None);
            }
            if packet.command == Command::Redirect && !self.forward_redirect(&mut packet).await? {
                return Ok(None);
            }

            let message_hash = packet.message_hash;
            let command = packet.command;
            let subcommand = packet.subcommand;
            let handle = self.pool.get_free(packet.clone());
            let (accepted, remaining) = self.reassembler.append(&packet, handle);
            if !accepted || remaining > 0 {
                return Ok(None);
            }
            let entry = self.reassembler.take_complete(&message_hash).expect("just completed");

            if command != Command::Redirect {
                let fp = Fingerprint::of(&message_hash, 0);
                if self.replay.push_and_increase(fp) > 1 {
                    return Ok(None);
                }
            }

            return Ok(Some(Delivered { command, subcommand, sender, payload: entry.combine() }));
        }

        if packet.command == Command::Redirect {
            if !self.forward_redirect(&mut packet).await? {
                return Ok(None);
            }
        } else {
            let fp = Fingerprint::of_packet(&packet);
            if self.replay.push_and_increase(fp) > 1 {
                return Ok(None);
            }
        }

        Ok(Some(Delivered {
            command: packet.command,
            subcommand: packet.subcommand,
            sender,
            payload: packet.payload,
        }))
    }

    /// Loops sending a `Registration` packet (payload: the decimal version
    /// number) to `signal_server` every `REGISTRATION_RETRY`, until one of
    /// the three outcomes in spec.md §4.5.5 arrives.
    pub async fn register(&mut self, signal_server: SocketAddr, version_text: &str) -> NetworkResult<RegistrationOutcome> {
        loop {
            let packets = self.build_packets(Command::Registration, Subcommand::Empty, version_text.as_bytes().to_vec())?;
            for packet in &packets {
                self.socket.send_to(&packet.to_bytes()?, signal_server).await?;
            }

            match timeout(REGISTRATION_RETRY, self.recv_dispatch()).await {
                Ok(Ok(Some(delivered))) => match (delivered.command, delivered.subcommand) {
                    (Command::Registration, Subcommand::RegistrationLevelNode) => {
                        return Ok(RegistrationOutcome::Connected { round_table: delivered.payload });
                    }
                    (Command::Redirect, Subcommand::RegistrationLevelNode) => {
                        return Ok(RegistrationOutcome::RoundInProgress { round_table: delivered.payload });
                    }
                    (Command::RegistrationConnectionRefused, _) => return Ok(RegistrationOutcome::Refused),
                    _ => continue,
                },
                Ok(Ok(None)) => continue,
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => continue,
            }
        }
    }
}
