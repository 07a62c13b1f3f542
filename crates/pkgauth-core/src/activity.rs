//! Per-package activity counters
//!
//! Granted operations bump `counts.<operation>` and, for named users,
//! `users.<user>.<operation>` on the package's document. Recording never
//! delays or fails the access decision.

use pkgauth_db::{DbError, DocumentStore, Filter, Increment};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Configuration, Operation};

struct Target {
    store: Arc<dyn DocumentStore>,
    collection: String,
    package_field: String,
}

/// Records granted operations in the package collection when enabled
#[derive(Clone)]
pub struct ActivityRecorder {
    target: Option<Arc<Target>>,
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Configuration) -> Self {
        let target = match (&config.package_collection, config.count_activity) {
            (Some(collection), true) => Some(Arc::new(Target {
                store,
                collection: collection.clone(),
                package_field: config.fields.package_name.clone(),
            })),
            _ => None,
        };
        Self { target }
    }

    /// A recorder that does nothing
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Record in the background; failures are logged and dropped
    pub fn record(&self, operation: Operation, user: Option<&str>, package: &str) {
        let Some(target) = self.target.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, skipping activity record for {}", package);
            return;
        };

        let user = user.map(str::to_string);
        let package = package.to_string();
        handle.spawn(async move {
            if let Err(e) = target.increment(operation, user.as_deref(), &package).await {
                warn!("Failed to record {} activity for {}: {}", operation, package, e);
            }
        });
    }

    /// Record and wait for the store write
    #[cfg(test)]
    async fn record_now(
        &self,
        operation: Operation,
        user: Option<&str>,
        package: &str,
    ) -> Result<(), DbError> {
        match &self.target {
            Some(target) => target.increment(operation, user, package).await,
            None => Ok(()),
        }
    }
}

impl Target {
    async fn increment(
        &self,
        operation: Operation,
        user: Option<&str>,
        package: &str,
    ) -> Result<(), DbError> {
        let increments = increments_for(operation, user);
        self.store
            .increment_counters(
                &self.collection,
                &Filter::eq(&self.package_field, package),
                &increments,
                true,
            )
            .await?;
        debug!("Recorded {} activity for {}", operation, package);
        Ok(())
    }
}

/// Counter paths for one operation
///
/// Dots in user names would split the path, so they are replaced.
fn increments_for(operation: Operation, user: Option<&str>) -> Vec<Increment> {
    let mut increments = vec![Increment::new(format!("counts.{}", operation), 1)];
    if let Some(user) = user.filter(|u| !u.is_empty()) {
        increments.push(Increment::new(
            format!("users.{}.{}", user.replace('.', "_"), operation),
            1,
        ));
    }
    increments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingStore, raw_config};
    use pkgauth_db::Projection;
    use serde_json::json;

    fn recorder(store: Arc<CountingStore>, enabled: bool) -> ActivityRecorder {
        let mut raw = raw_config();
        raw.count_activity = Some(enabled);
        raw.package_collection = Some("packages".to_string());
        ActivityRecorder::new(store, &raw.resolve().unwrap())
    }

    #[test]
    fn test_increments_for() {
        assert_eq!(
            increments_for(Operation::Publish, Some("jane.doe")),
            vec![
                Increment::new("counts.publish", 1),
                Increment::new("users.jane_doe.publish", 1)
            ]
        );
        assert_eq!(
            increments_for(Operation::Access, None),
            vec![Increment::new("counts.access", 1)]
        );
    }

    #[tokio::test]
    async fn test_record_now_upserts_counters() {
        let store = CountingStore::new();
        let recorder = recorder(store.clone(), true);
        assert!(recorder.is_enabled());

        recorder
            .record_now(Operation::Access, Some("alice"), "left-pad")
            .await
            .unwrap();
        recorder
            .record_now(Operation::Access, None, "left-pad")
            .await
            .unwrap();

        let doc = store
            .inner
            .find_one("packages", &Filter::eq("packagename", "left-pad"), &Projection::all())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["counts"]["access"], json!(2));
        assert_eq!(doc["users"]["alice"]["access"], json!(1));
    }

    #[tokio::test]
    async fn test_disabled_without_flag_or_collection() {
        let store = CountingStore::new();
        assert!(!recorder(store.clone(), false).is_enabled());

        let mut raw = raw_config();
        raw.count_activity = Some(true);
        assert!(!ActivityRecorder::new(store.clone(), &raw.resolve().unwrap()).is_enabled());

        ActivityRecorder::disabled()
            .record_now(Operation::Publish, Some("alice"), "left-pad")
            .await
            .unwrap();
        assert!(store.increments.lock().is_empty());
    }

    #[tokio::test]
    async fn test_background_failure_is_swallowed() {
        let store = CountingStore::new();
        store.set_failing(true);
        let recorder = recorder(store.clone(), true);

        recorder.record(Operation::Publish, Some("alice"), "left-pad");
        tokio::task::yield_now().await;
        assert!(recorder.record_now(Operation::Publish, None, "left-pad").await.is_err());
    }
}
