//! Username/password authentication
//!
//! Successful store-backed logins are cached per user so repeated logins
//! within the TTL skip the store round-trip. Every login still pays for a
//! password verification, cached or not.

use pkgauth_auth::{AuthError, CachedCredential, CredentialCache, PasswordCodec};
use pkgauth_db::{Document, DocumentStore, Filter, Projection};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::{Configuration, FieldNames};

/// Group assigned to users whose record carries no groups
pub const DEFAULT_GROUP: &str = "user";

const DENIED_MESSAGE: &str = "bad username/password, access denied";
const CHANGE_PASSWORD_MESSAGE: &str = "You are not allowed to change the password via the CLI!";

#[derive(Debug, PartialEq)]
enum CacheLookup {
    Skipped,
    Miss,
    Hit(CachedCredential),
}

/// Verifies credentials against the user collection
pub struct Authenticator {
    store: Arc<dyn DocumentStore>,
    codec: Arc<dyn PasswordCodec>,
    cache: CredentialCache,
    collection: String,
    fields: FieldNames,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        codec: Arc<dyn PasswordCodec>,
        config: &Configuration,
    ) -> Self {
        Self {
            store,
            codec,
            cache: CredentialCache::new(config.cache),
            collection: config.user_collection.clone(),
            fields: config.fields.clone(),
        }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// The cache is keyed by username and never consulted for an empty one
    fn lookup_cache(&self, username: &str) -> CacheLookup {
        if username.is_empty() {
            return CacheLookup::Skipped;
        }
        match self.cache.get(username) {
            Some(cached) => CacheLookup::Hit(cached),
            None => CacheLookup::Miss,
        }
    }

    /// Authenticate a user, returning their groups on success
    ///
    /// The returned list always ends with the username itself and never
    /// contains duplicates.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Vec<String>, AuthError> {
        match self.lookup_cache(username) {
            CacheLookup::Hit(cached) => {
                if self.verify(password, &cached.password_digest).await? {
                    debug!("Authenticated '{}' from credential cache", username);
                    record_cache("hit");
                    record_attempt("success");
                    return Ok(cached.groups);
                }
                debug!("Cached credential for '{}' did not match, checking the store", username);
                record_cache("miss");
            }
            CacheLookup::Miss => record_cache("miss"),
            CacheLookup::Skipped => debug!("Empty username, not consulting the credential cache"),
        }

        let projection = Projection::new([
            self.fields.username.as_str(),
            self.fields.password.as_str(),
            self.fields.groups.as_str(),
        ]);
        let record = self
            .store
            .find_one(
                &self.collection,
                &Filter::eq(&self.fields.username, username),
                &projection,
            )
            .await
            .map_err(|e| {
                error!("User lookup for '{}' failed: {}", username, e);
                record_attempt("error");
                AuthError::Internal(format!("error, try again: {}", e))
            })?;

        let Some(record) = record else {
            debug!("User '{}' not found", username);
            return Err(deny());
        };

        let Some(digest) = record.get(&self.fields.password).and_then(Value::as_str) else {
            debug!("User '{}' has no password digest", username);
            return Err(deny());
        };

        if !self.verify(password, digest).await? {
            debug!("Password mismatch for '{}'", username);
            return Err(deny());
        }

        let groups = resolve_groups(&record, &self.fields.groups, username);
        self.cache.put(
            username,
            CachedCredential {
                password_digest: digest.to_string(),
                groups: groups.clone(),
            },
        );

        info!("Authenticated '{}' (groups: {:?})", username, groups);
        record_attempt("success");
        Ok(groups)
    }

    /// Password changes are not supported; always fails with `NotAllowed`
    pub fn change_password(&self, username: &str, _old: &str, _new: &str) -> AuthError {
        debug!("Rejected password change for '{}'", username);
        AuthError::NotAllowed(CHANGE_PASSWORD_MESSAGE.to_string())
    }

    async fn verify(&self, password: &str, digest: &str) -> Result<bool, AuthError> {
        let codec = self.codec.clone();
        let password = password.to_string();
        let digest = digest.to_string();

        tokio::task::spawn_blocking(move || codec.verify(&password, &digest))
            .await
            .map_err(|e| {
                record_attempt("error");
                AuthError::Internal(format!("Password verification task failed: {}", e))
            })
    }
}

fn deny() -> AuthError {
    record_attempt("failure");
    AuthError::Unauthorized(DENIED_MESSAGE.to_string())
}

fn record_attempt(outcome: &'static str) {
    metrics::counter!("pkgauth_auth_attempts_total", "outcome" => outcome).increment(1);
}

fn record_cache(result: &'static str) {
    metrics::counter!("pkgauth_credential_cache_total", "result" => result).increment(1);
}

/// Stored groups (or the default group), followed by the username, deduplicated
fn resolve_groups(record: &Document, field: &str, username: &str) -> Vec<String> {
    let stored: Vec<String> = match record.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(group)) if !group.is_empty() => vec![group.clone()],
        _ => Vec::new(),
    };

    let mut groups = if stored.is_empty() {
        vec![DEFAULT_GROUP.to_string()]
    } else {
        stored
    };
    groups.push(username.to_string());

    let mut seen = HashSet::new();
    groups.retain(|group| seen.insert(group.clone()));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingStore, cheap_codec, config, seed_user};
    use serde_json::json;
    use std::time::Duration;

    fn authenticator(store: Arc<CountingStore>) -> Authenticator {
        Authenticator::new(store, cheap_codec(), &config())
    }

    #[tokio::test]
    async fn test_authenticate_returns_groups_and_username() {
        let store = CountingStore::new();
        seed_user(&*store, "alice", "password4711", json!(["dev", "ops"])).await;
        let auth = authenticator(store);

        let groups = auth.authenticate("alice", "password4711").await.unwrap();
        assert_eq!(groups, vec!["dev", "ops", "alice"]);
    }

    #[tokio::test]
    async fn test_missing_groups_default_to_user() {
        let store = CountingStore::new();
        seed_user(&*store, "bob", "password4711", json!([])).await;
        seed_user(&*store, "carol", "password4711", Value::Null).await;
        let auth = authenticator(store);

        assert_eq!(auth.authenticate("bob", "password4711").await.unwrap(), vec!["user", "bob"]);
        assert_eq!(
            auth.authenticate("carol", "password4711").await.unwrap(),
            vec!["user", "carol"]
        );
    }

    #[tokio::test]
    async fn test_groups_are_deduplicated() {
        let store = CountingStore::new();
        seed_user(&*store, "dave", "password4711", json!(["dev", "dave", "dev"])).await;
        let auth = authenticator(store);

        let groups = auth.authenticate("dave", "password4711").await.unwrap();
        assert_eq!(groups, vec!["dev", "dave"]);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_are_unauthorized() {
        let store = CountingStore::new();
        seed_user(&*store, "alice", "password4711", json!(["dev"])).await;
        let auth = authenticator(store);

        let err = auth.authenticate("alice", "wrong-password").await.unwrap_err();
        assert_eq!(err, AuthError::Unauthorized(DENIED_MESSAGE.to_string()));
        assert!(auth.cache().get("alice").is_none());

        let err = auth.authenticate("mallory", "password4711").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
        assert!(auth.cache().is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = CountingStore::new();
        seed_user(&*store, "alice", "password4711", json!(["dev"])).await;
        let auth = authenticator(store.clone());

        let first = auth.authenticate("alice", "password4711").await.unwrap();
        assert_eq!(store.finds(), 1);

        let second = auth.authenticate("alice", "password4711").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn test_empty_username_bypasses_cache() {
        let store = CountingStore::new();
        let auth = authenticator(store.clone());
        let credential = CachedCredential {
            password_digest: cheap_codec().hash("password4711").unwrap(),
            groups: vec!["user".to_string()],
        };
        auth.cache().put("", credential.clone());
        auth.cache().put("alice", credential.clone());

        assert_eq!(auth.lookup_cache(""), CacheLookup::Skipped);
        assert_eq!(auth.lookup_cache("alice"), CacheLookup::Hit(credential));
        assert_eq!(auth.lookup_cache("bob"), CacheLookup::Miss);

        let err = auth.authenticate("", "password4711").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn test_cache_miss_on_wrong_password_falls_back_to_store() {
        let store = CountingStore::new();
        seed_user(&*store, "alice", "password4711", json!(["dev"])).await;
        let auth = authenticator(store.clone());

        auth.authenticate("alice", "password4711").await.unwrap();
        let err = auth.authenticate("alice", "not-the-password").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
        assert_eq!(store.finds(), 2);

        // The cached entry survives a failed attempt
        assert!(auth.cache().get("alice").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_entry_goes_back_to_store() {
        let store = CountingStore::new();
        seed_user(&*store, "alice", "password4711", json!(["dev"])).await;
        let auth = authenticator(store.clone());

        auth.authenticate("alice", "password4711").await.unwrap();
        tokio::time::advance(auth.cache().ttl() + Duration::from_millis(1)).await;

        auth.authenticate("alice", "password4711").await.unwrap();
        assert_eq!(store.finds(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let store = CountingStore::new();
        store.set_failing(true);
        let auth = authenticator(store);

        let err = auth.authenticate("alice", "password4711").await.unwrap_err();
        match err {
            AuthError::Internal(message) => assert!(message.starts_with("error, try again")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cached_user_survives_store_outage() {
        let store = CountingStore::new();
        seed_user(&*store, "alice", "password4711", json!(["dev"])).await;
        let auth = authenticator(store.clone());

        auth.authenticate("alice", "password4711").await.unwrap();
        store.set_failing(true);
        assert!(auth.authenticate("alice", "password4711").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_is_not_allowed() {
        let auth = authenticator(CountingStore::new());
        let err = auth.change_password("alice", "old-password", "new-password");
        assert_eq!(err, AuthError::NotAllowed(CHANGE_PASSWORD_MESSAGE.to_string()));
    }

    #[test]
    fn test_resolve_groups_accepts_single_string() {
        let mut record = Document::new();
        record.insert("usergroups".into(), json!("ops"));
        assert_eq!(resolve_groups(&record, "usergroups", "erin"), vec!["ops", "erin"]);
    }
}
