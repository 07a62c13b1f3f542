//! Shared fixtures for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use pkgauth_auth::{Argon2Codec, PasswordCodec};
use pkgauth_db::{
    DbError, Document, DocumentStore, Filter, InMemoryDocumentStore, Increment, Projection,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::{Configuration, PluginConfig};

/// In-memory store that counts lookups and can be switched into a failing mode
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryDocumentStore,
    pub finds: AtomicUsize,
    pub inserts: AtomicUsize,
    pub increments: Mutex<Vec<(Filter, Vec<Increment>)>>,
    pub failing: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DbError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DbError::Connection(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Option<Document>, DbError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_one(collection, filter, projection).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DbError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.insert_one(collection, document).await
    }

    async fn increment_counters(
        &self,
        collection: &str,
        filter: &Filter,
        increments: &[Increment],
        upsert: bool,
    ) -> Result<(), DbError> {
        self.check()?;
        self.increments
            .lock()
            .push((filter.clone(), increments.to_vec()));
        self.inner
            .increment_counters(collection, filter, increments, upsert)
            .await
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), DbError> {
        self.check()?;
        self.inner.ensure_unique_index(collection, field).await
    }
}

pub fn cheap_codec() -> Arc<dyn PasswordCodec> {
    Arc::new(Argon2Codec::with_cost(64, 1, 1).unwrap())
}

pub fn config() -> Configuration {
    raw_config().resolve().unwrap()
}

pub fn raw_config() -> PluginConfig {
    PluginConfig {
        store_uri: Some("memory://".to_string()),
        database_name: Some("registry".to_string()),
        user_collection: Some("users".to_string()),
        ..Default::default()
    }
}

/// Insert a user document with a digest produced by [`cheap_codec`]
pub async fn seed_user(store: &dyn DocumentStore, username: &str, password: &str, groups: serde_json::Value) {
    let digest = cheap_codec().hash(password).unwrap();
    let document = json!({
        "username": username,
        "password": digest,
        "usergroups": groups,
    });
    let serde_json::Value::Object(document) = document else {
        unreachable!()
    };
    store.insert_one("users", document).await.unwrap();
}
