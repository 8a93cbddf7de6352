use rusqlite::ffi;
use thiserror::Error;

/// Store failures, with constraint violations classified so the service
/// layer can translate them without inspecting SQLite error codes itself.
#[derive(Debug, Error)]
pub enum StoreError {
    /// UNIQUE or PRIMARY KEY constraint hit on insert.
    #[error("row already exists")]
    Conflict,

    /// Insert referenced a row that does not exist.
    #[error("referenced row does not exist")]
    ForeignKey,

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Classify a raw SQLite failure from an insert/update path.
    pub(crate) fn classify(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            match e.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return StoreError::Conflict;
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return StoreError::ForeignKey,
                _ => {}
            }
        }
        StoreError::Sqlite(err)
    }
}
