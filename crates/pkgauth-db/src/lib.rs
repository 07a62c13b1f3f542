//! pkgauth Credential Store
//!
//! This crate provides the document-store abstraction the authentication
//! core reads user records from, with a SQLite-backed implementation
//! (JSON documents via sqlx) and an in-memory implementation.

pub mod error;
pub mod memory;
pub mod models;
pub mod sqlite;
pub mod store;
pub mod utils;

pub use error::DbError;
pub use memory::InMemoryDocumentStore;
pub use models::{Document, Filter, Increment, Projection};
pub use sqlite::SqliteDocumentStore;
pub use store::{DocumentStore, open_store};
