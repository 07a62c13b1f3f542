//! SQLite-backed document store
//!
//! Each `(database, collection)` pair maps to a table named
//! `{database}__{collection}` holding one JSON document per row.
//! Field lookups go through `json_extract` with the JSON path bound as a
//! query parameter.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::DbError;
use crate::models::{Document, Filter, Increment, Projection};
use crate::store::DocumentStore;
use crate::utils::{json_path, nested_json_path, redact_uri, validate_identifier};

/// Upper bound on pooled connections for file-backed databases
const MAX_CONNECTIONS: u32 = 8;

/// How long a write waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Document store persisted in a SQLite database
///
/// The connection pool is created lazily on the first operation and each
/// operation acquires its own pooled connection, which is returned to the
/// pool when the operation finishes. Counter updates are single statements,
/// so concurrent writers wait on SQLite's lock instead of failing mid-way.
pub struct SqliteDocumentStore {
    url: String,
    database: String,
    pool: OnceCell<SqlitePool>,
    prepared: Mutex<HashSet<String>>,
}

impl SqliteDocumentStore {
    /// Create a store for `url`; does not connect
    pub fn new(url: &str, database: &str) -> Result<Self, DbError> {
        validate_identifier("database", database)?;
        Ok(Self {
            url: url.to_string(),
            database: database.to_string(),
            pool: OnceCell::new(),
            prepared: Mutex::new(HashSet::new()),
        })
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Every connection to an in-memory database sees its own empty database,
    /// so those pools keep exactly one connection open for the store's lifetime
    fn pool_options(&self) -> SqlitePoolOptions {
        if self.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        }
    }

    /// Get the pool, connecting on first use
    async fn pool(&self) -> Result<&SqlitePool, DbError> {
        self.pool
            .get_or_try_init(|| async {
                info!("Connecting to document store: {}", redact_uri(&self.url));

                let options = SqliteConnectOptions::from_str(&self.url)?
                    .create_if_missing(true)
                    .busy_timeout(BUSY_TIMEOUT);

                let pool = self.pool_options().connect_with(options).await?;
                Ok::<_, DbError>(pool)
            })
            .await
    }

    fn table_name(&self, collection: &str) -> String {
        format!("{}__{}", self.database, collection)
    }

    /// Create the backing table for a collection if needed, returning its name
    async fn ensure_collection(&self, collection: &str) -> Result<String, DbError> {
        validate_identifier("collection", collection)?;
        let table = self.table_name(collection);
        if self.prepared.lock().contains(&table) {
            return Ok(table);
        }

        let mut conn = self.pool().await?.acquire().await?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document TEXT NOT NULL
            )
            "#,
            table
        ))
        .execute(&mut *conn)
        .await?;

        debug!("Prepared collection table {}", table);
        self.prepared.lock().insert(table.clone());
        Ok(table)
    }

    /// Apply increments to the first matching document in a single statement,
    /// returning the number of rows changed
    async fn update_counters(
        &self,
        table: &str,
        filter: &Filter,
        increments: &[Increment],
    ) -> Result<u64, DbError> {
        let mut expression = "document".to_string();
        for _ in increments {
            expression = format!(
                "json_set({}, ?, COALESCE(json_extract(document, ?), 0) + ?)",
                expression
            );
        }

        let sql = format!(
            r#"UPDATE "{table}" SET document = {expression}
               WHERE id = (SELECT id FROM "{table}" WHERE json_extract(document, ?) = ? ORDER BY id LIMIT 1)"#,
            table = table,
            expression = expression
        );
        let mut query = sqlx::query(&sql);
        for increment in increments {
            let path = nested_json_path(&increment.path);
            query = query.bind(path.clone()).bind(path).bind(increment.by);
        }

        let result = query
            .bind(json_path(&filter.field))
            .bind(&filter.value)
            .execute(self.pool().await?)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Sum increments that target the same path
fn merge_increments(increments: &[Increment]) -> Vec<Increment> {
    let mut merged: Vec<Increment> = Vec::with_capacity(increments.len());
    for increment in increments {
        match merged.iter_mut().find(|m| m.path == increment.path) {
            Some(existing) => existing.by += increment.by,
            None => merged.push(increment.clone()),
        }
    }
    merged
}

fn parse_document(text: &str) -> Result<Document, DbError> {
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Option<Document>, DbError> {
        validate_identifier("field", &filter.field)?;
        let table = self.ensure_collection(collection).await?;

        let mut conn = self.pool().await?.acquire().await?;
        let row = sqlx::query(&format!(
            r#"SELECT document FROM "{}" WHERE json_extract(document, ?) = ? ORDER BY id LIMIT 1"#,
            table
        ))
        .bind(json_path(&filter.field))
        .bind(&filter.value)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|row| -> Result<Document, DbError> {
            let text: String = row.try_get("document")?;
            Ok(projection.apply(parse_document(&text)?))
        })
        .transpose()
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DbError> {
        let table = self.ensure_collection(collection).await?;
        let text = serde_json::to_string(&document)?;

        let mut conn = self.pool().await?.acquire().await?;
        sqlx::query(&format!(r#"INSERT INTO "{}" (document) VALUES (?)"#, table))
            .bind(text)
            .execute(&mut *conn)
            .await
            .map_err(|e| DbError::from_write(e, collection))?;
        Ok(())
    }

    async fn increment_counters(
        &self,
        collection: &str,
        filter: &Filter,
        increments: &[Increment],
        upsert: bool,
    ) -> Result<(), DbError> {
        validate_identifier("field", &filter.field)?;
        let table = self.ensure_collection(collection).await?;
        let increments = merge_increments(increments);

        if self.update_counters(&table, filter, &increments).await? > 0 {
            return Ok(());
        }
        if !upsert {
            debug!(
                "No document in '{}' matches {} = {}, skipping increment",
                collection, filter.field, filter.value
            );
            return Ok(());
        }

        let mut document = Document::new();
        document.insert(filter.field.clone(), Value::String(filter.value.clone()));
        for increment in &increments {
            increment.apply(&mut document);
        }

        // Inserts only if no matching document appeared since the update
        let inserted = sqlx::query(&format!(
            r#"INSERT INTO "{table}" (document)
               SELECT ? WHERE NOT EXISTS (SELECT 1 FROM "{table}" WHERE json_extract(document, ?) = ?)"#,
            table = table
        ))
        .bind(serde_json::to_string(&document)?)
        .bind(json_path(&filter.field))
        .bind(&filter.value)
        .execute(self.pool().await?)
        .await
        .map_err(|e| DbError::from_write(e, collection))?
        .rows_affected();

        if inserted == 0 {
            debug!("Concurrent upsert created '{}' in {}, retrying increment", filter.value, table);
            self.update_counters(&table, filter, &increments).await?;
        }
        Ok(())
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), DbError> {
        validate_identifier("field", field)?;
        let table = self.ensure_collection(collection).await?;

        // Expression indexes cannot take bound parameters; both identifiers are validated
        let mut conn = self.pool().await?.acquire().await?;
        sqlx::query(&format!(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "ux_{table}_{field}" ON "{table}" (json_extract(document, '{path}'))"#,
            table = table,
            field = field,
            path = json_path(field),
        ))
        .execute(&mut *conn)
        .await?;

        info!("Ensured unique index on {}.{}", table, field);
        Ok(())
    }
}
