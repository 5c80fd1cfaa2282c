use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] ringchain_core::CoreError),

    #[error("registration refused: version mismatch")]
    RegistrationRefused,
}

pub type NetworkResult<T> = Result<T, NetworkError>;
