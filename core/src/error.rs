use thiserror::Error;

/// Errors raised while decoding or validating wire-level and storage-level
/// data structures (packets, pools, transactions).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("trailing bytes after decoding ({remaining} left over)")]
    TrailingBytes { remaining: usize },

    #[error("varint is longer than 9 bytes")]
    VarintTooLong,

    #[error("fragment count {0} exceeds MAX_FRAGMENTS")]
    TooManyFragments(u16),

    #[error("fragment index {index} out of range for fragment count {count}")]
    FragmentIndexOutOfRange { index: u16, count: u16 },

    #[error("unknown command byte {0}")]
    UnknownCommand(u8),

    #[error("unknown subcommand byte {0}")]
    UnknownSubcommand(u8),

    #[error("unknown user field type byte {0}")]
    UnknownUserFieldType(u8),

    #[error("malformed pool: {0}")]
    MalformedPool(&'static str),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(&'static str),

    #[error("fractional part {0} is not smaller than 10^18")]
    AmountFractionOverflow(u64),

    #[error("pool is already composed and cannot be mutated")]
    PoolAlreadyComposed,

    #[error("public key text must be exactly 44 characters, got {0}")]
    BadPublicKeyLength(usize),
}

pub type CoreResult<T> = Result<T, CoreError>;
