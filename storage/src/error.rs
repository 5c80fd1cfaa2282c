use thiserror::Error;

/// Storage fault codes, per spec.md §4.8.5. `NoError` isn't modeled as a
/// variant here: the absence of a last error is `Storage::last_error()`
/// returning `None`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage is not open")]
    NotOpen,

    #[error("key/value engine error: {0}")]
    DatabaseTable(#[from] redb::TableError),

    #[error("key/value engine error: {0}")]
    DatabaseCommit(#[from] redb::CommitError),

    #[error("key/value engine error: {0}")]
    DatabaseTransaction(#[from] redb::TransactionError),

    #[error("key/value engine error: {0}")]
    DatabaseStorage(#[from] redb::StorageError),

    #[error("key/value engine open error: {0}")]
    DatabaseOpen(#[from] redb::DatabaseError),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("rescan cancelled by caller")]
    UserCancelled,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Core(#[from] ringchain_core::CoreError),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
