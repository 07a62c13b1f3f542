//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported store URI: {0}")]
    UnsupportedUri(String),
}

impl DbError {
    /// Whether the store rejected a write because of a unique index
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DbError::Duplicate(_))
    }

    /// Classify a failed write, surfacing unique-constraint violations as `Duplicate`
    pub(crate) fn from_write(err: sqlx::Error, collection: &str) -> Self {
        let unique = err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation());
        if unique {
            DbError::Duplicate(format!("duplicate key in collection '{}'", collection))
        } else {
            DbError::Connection(err)
        }
    }
}
