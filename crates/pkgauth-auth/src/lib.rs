//! pkgauth Authentication Primitives
//!
//! This crate provides the password codec, the short-lived credential
//! cache, and the error taxonomy shared by the authentication and
//! authorization layers.

pub mod cache;
pub mod error;
pub mod password;

pub use cache::{CacheSettings, CachedCredential, CredentialCache};
pub use error::AuthError;
pub use password::{Argon2Codec, PasswordCodec};
