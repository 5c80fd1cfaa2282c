use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Core(#[from] ringchain_core::CoreError),

    #[error(transparent)]
    Network(#[from] ringchain_network::error::NetworkError),

    #[error(transparent)]
    Storage(#[from] ringchain_storage::StorageError),

    #[error(transparent)]
    Mempool(#[from] ringchain_mempool::MempoolError),

    #[error(transparent)]
    Consensus(#[from] ringchain_consensus::ConsensusError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("role precondition violated: {0}")]
    RolePrecondition(&'static str),
}

pub type NodeResult<T> = Result<T, NodeError>;
