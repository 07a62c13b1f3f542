//! In-memory document store

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::DbError;
use crate::models::{Document, Filter, Increment, Projection};
use crate::store::DocumentStore;
use crate::utils::validate_identifier;

#[derive(Default)]
struct Collection {
    documents: Vec<Document>,
    unique_fields: HashSet<String>,
}

impl Collection {
    fn violates_unique(&self, document: &Document) -> Option<&str> {
        self.unique_fields
            .iter()
            .find(|field| {
                document.get(field.as_str()).is_some_and(|value| {
                    self.documents
                        .iter()
                        .any(|existing| existing.get(field.as_str()) == Some(value))
                })
            })
            .map(String::as_str)
    }
}

/// Process-local document store
///
/// Used for `memory://` URIs and in tests. Contents are lost when the
/// store is dropped.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Option<Document>, DbError> {
        validate_identifier("collection", collection)?;
        let collections = self.collections.read();
        Ok(collections.get(collection).and_then(|c| {
            c.documents
                .iter()
                .find(|doc| filter.matches(doc))
                .map(|doc| projection.apply(doc.clone()))
        }))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DbError> {
        validate_identifier("collection", collection)?;
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();

        if let Some(field) = target.violates_unique(&document) {
            return Err(DbError::Duplicate(format!(
                "duplicate key in collection '{}' on field '{}'",
                collection, field
            )));
        }

        target.documents.push(document);
        Ok(())
    }

    async fn increment_counters(
        &self,
        collection: &str,
        filter: &Filter,
        increments: &[Increment],
        upsert: bool,
    ) -> Result<(), DbError> {
        validate_identifier("collection", collection)?;
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();

        match target.documents.iter_mut().find(|doc| filter.matches(doc)) {
            Some(document) => {
                for increment in increments {
                    increment.apply(document);
                }
            }
            None if upsert => {
                let mut document = Document::new();
                document.insert(filter.field.clone(), Value::String(filter.value.clone()));
                for increment in increments {
                    increment.apply(&mut document);
                }
                target.documents.push(document);
            }
            None => {
                debug!(
                    "No document in '{}' matches {} = {}, skipping increment",
                    collection, filter.field, filter.value
                );
            }
        }
        Ok(())
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), DbError> {
        validate_identifier("collection", collection)?;
        validate_identifier("field", field)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .unique_fields
            .insert(field.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(name: &str) -> Document {
        let mut doc = Document::new();
        doc.insert("username".into(), json!(name));
        doc.insert("password".into(), json!("digest"));
        doc.insert("usergroups".into(), json!([name, "user"]));
        doc.insert("email".into(), json!(format!("{}@example.com", name)));
        doc
    }

    #[tokio::test]
    async fn test_find_one_applies_projection() {
        let store = InMemoryDocumentStore::new();
        store.insert_one("users", user("alice")).await.unwrap();
        store.insert_one("users", user("bob")).await.unwrap();

        let found = store
            .find_one(
                "users",
                &Filter::eq("username", "bob"),
                &Projection::new(["username", "usergroups"]),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found["username"], json!("bob"));
        assert!(!found.contains_key("password"));
        assert!(!found.contains_key("email"));

        let missing = store
            .find_one("users", &Filter::eq("username", "carol"), &Projection::all())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let store = InMemoryDocumentStore::new();
        store.ensure_unique_index("users", "username").await.unwrap();
        store.insert_one("users", user("alice")).await.unwrap();

        let err = store.insert_one("users", user("alice")).await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.count("users"), 1);
    }

    #[tokio::test]
    async fn test_duplicates_allowed_without_index() {
        let store = InMemoryDocumentStore::new();
        store.insert_one("users", user("alice")).await.unwrap();
        store.insert_one("users", user("alice")).await.unwrap();
        assert_eq!(store.count("users"), 2);
    }

    #[tokio::test]
    async fn test_increment_counters_upsert() {
        let store = InMemoryDocumentStore::new();
        let filter = Filter::eq("packagename", "left-pad");
        let increments = [Increment::new("counts.access", 1)];

        store
            .increment_counters("packages", &filter, &increments, false)
            .await
            .unwrap();
        assert_eq!(store.count("packages"), 0);

        store
            .increment_counters("packages", &filter, &increments, true)
            .await
            .unwrap();
        store
            .increment_counters("packages", &filter, &increments, true)
            .await
            .unwrap();

        let doc = store
            .find_one("packages", &filter, &Projection::all())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["counts"]["access"], json!(2));
        assert_eq!(store.count("packages"), 1);
    }
}
