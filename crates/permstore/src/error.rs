use thiserror::Error;

/// Error surface for every public `Store` operation.
///
/// Variants map directly onto the error kinds callers need to match on;
/// the store never retries internally and never swallows an error on any
/// write path, partial or otherwise.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no permissions row found")]
    NotFound,

    #[error("updated_at must be set before an upsert")]
    MissingTimestamp,

    #[error("stored bitset payload failed to decode: {0}")]
    CorruptBitset(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
