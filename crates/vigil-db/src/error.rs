use thiserror::Error;

/// Domain-level failures raised by the store. The API layer maps these onto
/// HTTP statuses; anything not listed here is an opaque SQLite failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("you cannot do that to your own content")]
    OwnContent,

    #[error("database lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Maps a UNIQUE constraint violation to `Conflict`, everything else through.
pub(crate) fn unique_conflict(err: rusqlite::Error, what: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(format!("{what} is already taken"))
        }
        other => StoreError::Sqlite(other),
    }
}
