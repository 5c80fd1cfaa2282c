use thiserror::Error;

#[derive(Error, Debug)]
pub enum MempoolError {
    #[error("mempool is full")]
    Full,

    #[error(transparent)]
    Core(#[from] ringchain_core::CoreError),
}

pub type MempoolResult<T> = Result<T, MempoolError>;
