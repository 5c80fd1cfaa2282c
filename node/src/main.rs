//! Node entry point: load configuration, derive identity, open storage,
//! complete the registration handshake, then run the single-threaded
//! receive/dispatch/retransmit loop until terminated.
//!
//! Grounded on the teacher's `node/src/service.rs` entry shape (init
//! tracing, load config, open storage, start transport, run to shutdown)
//! and spec.md §4.5.5/§7 (the registration handshake and the fatal-fault
//! grace sleep).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ringchain_consensus::NullSolver;
use ringchain_core::{Hash, NodeId, PublicKey};
use ringchain_network::session::{Identity, RegistrationOutcome, Session};
use ringchain_node::blockchain::Blockchain;
use ringchain_node::config::{NodeArgs, NodeConfig};
use ringchain_node::dispatch::Dispatcher;
use ringchain_node::role::{read_round_data, Node as RoleNode};
use ringchain_storage::Storage;
use tracing::{error, info, warn};

/// Fatal startup faults log and exit after this grace period, per
/// SPEC_FULL.md §C.5 (`SessionIO::SessionIO`'s 10-second sleep).
const FATAL_GRACE: Duration = Duration::from_secs(10);

const PROTOCOL_VERSION: u8 = 1;

async fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    error!(%err, "fatal startup failure: {context}");
    tokio::time::sleep(FATAL_GRACE).await;
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = NodeArgs::parse_args();

    let config = match NodeConfig::load(&args) {
        Ok(c) => c,
        Err(err) => fatal("loading configuration", err).await,
    };

    let public_key = match PublicKey::from_key_text(&config.public_key_text) {
        Ok(k) => k,
        Err(err) => fatal("deriving public key", err).await,
    };
    let sender_hash = match Hash::derive_identity(config.host_input.ip, &config.public_key_text) {
        Ok(h) => h,
        Err(err) => fatal("deriving identity hash", err).await,
    };
    let node_id = NodeId::new(config.host_input.ip);
    info!(%node_id, "node identity derived");

    let storage = match Storage::open(args.pool_db_path()) {
        Ok(s) => s,
        Err(err) => fatal("opening pool storage", err).await,
    };
    info!(pool_count = storage.pool_count(), "storage opened");

    let bind_addr: SocketAddr = args.bind.unwrap_or_else(|| config.host_input.to_socket_addr());
    let identity = Identity { node_id, public_key, sender_hash, version: PROTOCOL_VERSION };
    let signal_server = config.server.to_socket_addr();
    let session = match Session::bind(bind_addr, identity, config.host_output.port, Some(signal_server)).await {
        Ok(s) => s,
        Err(err) => fatal("binding UDP socket", err).await,
    };

    let solver = Arc::new(NullSolver::new(node_id.to_string()));
    let role = RoleNode::new(node_id, solver);
    let blockchain = Blockchain::new(storage);
    let mut dispatcher = Dispatcher::new(role, session, blockchain);

    if let Err(err) = register(&mut dispatcher, signal_server).await {
        fatal("registration handshake", err).await;
    }

    run(&mut dispatcher).await;
}

/// Drives the registration handshake (spec.md §4.5.5) and, on success,
/// ingests the returned round table exactly as the ordinary dispatch path
/// would.
async fn register(dispatcher: &mut Dispatcher, signal_server: SocketAddr) -> ringchain_node::NodeResult<()> {
    let outcome = dispatcher.session.register(signal_server, &PROTOCOL_VERSION.to_string()).await?;
    let round_table = match outcome {
        RegistrationOutcome::Connected { round_table } => {
            info!("registered as a plain node");
            round_table
        }
        RegistrationOutcome::RoundInProgress { round_table } => {
            info!("joining a round already in progress");
            round_table
        }
        RegistrationOutcome::Refused => {
            return Err(ringchain_node::NodeError::Config("registration refused: version mismatch".to_string()));
        }
    };

    let table = read_round_data(&round_table, true)?;
    if dispatcher.role.accept_round_table(&table) {
        dispatcher.session.peers_mut().admit(table.main_node);
        for confidant in &table.confidants {
            dispatcher.session.peers_mut().admit(*confidant);
        }
        for peer in &table.ring_seed {
            dispatcher.session.peers_mut().admit(*peer);
        }
        dispatcher.role.on_round_start().await;
        dispatcher.stats.on_round_start(dispatcher.role.round_num);
    }
    Ok(())
}

/// The single-threaded receive/dispatch/retransmit loop (spec.md §5): one
/// I/O thread, never blocking indefinitely on a socket read, and firing
/// due retransmissions between reads.
async fn run(dispatcher: &mut Dispatcher) -> ! {
    loop {
        match tokio::time::timeout(Duration::from_millis(2), dispatcher.session.recv_dispatch()).await {
            Ok(Ok(Some(delivered))) => {
                if let Err(err) = dispatcher.dispatch(delivered).await {
                    warn!(%err, "dispatch error");
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => warn!(%err, "receive error"),
            Err(_elapsed) => {}
        }

        if let Err(err) = dispatcher.session.flush_due(Instant::now()).await {
            warn!(%err, "retransmission flush error");
        }
    }
}
