use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(transparent)]
    Core(#[from] ringchain_core::CoreError),

    #[error("malformed consensus artifact: {0}")]
    Malformed(&'static str),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
