//! Document store trait

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::DbError;
use crate::memory::InMemoryDocumentStore;
use crate::models::{Document, Filter, Increment, Projection};
use crate::sqlite::SqliteDocumentStore;
use crate::utils::{redact_uri, validate_identifier};

/// Document store trait
///
/// Implementations hold JSON documents grouped into named collections.
/// Every method is an independent unit of work; implementations must be
/// safe to call concurrently.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find the first document matching `filter`, returning only the projected fields
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Option<Document>, DbError>;

    /// Insert a document; fails with `DbError::Duplicate` when a unique index is violated
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DbError>;

    /// Apply numeric increments to the first document matching `filter`.
    /// With `upsert`, a missing document is created from the filter field.
    async fn increment_counters(
        &self,
        collection: &str,
        filter: &Filter,
        increments: &[Increment],
        upsert: bool,
    ) -> Result<(), DbError>;

    /// Make `field` unique across the collection
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), DbError>;
}

/// Open a store for `uri`, namespacing collections under `database`
///
/// Supported schemes are `sqlite:` and `memory:`. No connection is made
/// until the first operation.
pub fn open_store(uri: &str, database: &str) -> Result<Arc<dyn DocumentStore>, DbError> {
    validate_identifier("database", database)?;

    if uri.starts_with("sqlite:") {
        info!("Using SQLite document store at {}", redact_uri(uri));
        Ok(Arc::new(SqliteDocumentStore::new(uri, database)?))
    } else if uri.starts_with("memory:") {
        info!("Using in-memory document store (database: {})", database);
        Ok(Arc::new(InMemoryDocumentStore::new()))
    } else {
        Err(DbError::UnsupportedUri(redact_uri(uri)))
    }
}
