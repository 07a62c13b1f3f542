//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] pkgauth_db::DbError),

    #[error("Auth error: {0}")]
    Auth(#[from] pkgauth_auth::AuthError),
}
