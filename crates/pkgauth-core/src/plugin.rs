//! Host-facing plugin facade
//!
//! Wires the store, codec, cache, and controllers together and exposes the
//! six operations a package registry calls.

use pkgauth_auth::{Argon2Codec, AuthError, PasswordCodec};
use pkgauth_db::{DocumentStore, open_store, utils::redact_uri};
use std::sync::Arc;
use tracing::info;

use crate::access::{AccessController, PackageAccess, RemoteUser};
use crate::activity::ActivityRecorder;
use crate::authenticator::Authenticator;
use crate::config::{Configuration, Operation};
use crate::error::CoreError;
use crate::registrar::Registrar;

pub struct AuthPlugin {
    config: Configuration,
    authenticator: Authenticator,
    registrar: Registrar,
    access: AccessController,
}

impl AuthPlugin {
    /// Open the configured store and build the plugin with argon2id hashing
    pub fn new(config: Configuration) -> Result<Self, CoreError> {
        let store = open_store(&config.store_uri, &config.database_name)?;
        Ok(Self::with_components(config, store, Arc::new(Argon2Codec::default())))
    }

    pub fn with_components(
        config: Configuration,
        store: Arc<dyn DocumentStore>,
        codec: Arc<dyn PasswordCodec>,
    ) -> Self {
        info!(
            "Initializing auth plugin (store: {}, database: {}, collection: {})",
            redact_uri(&config.store_uri),
            config.database_name,
            config.user_collection
        );

        let activity = ActivityRecorder::new(store.clone(), &config);
        Self {
            authenticator: Authenticator::new(store.clone(), codec.clone(), &config),
            registrar: Registrar::new(store, codec, &config),
            access: AccessController::new(&config, activity),
            config,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Vec<String>, AuthError> {
        self.authenticator.authenticate(username, password).await
    }

    /// Always fails with `NotAllowed`
    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<bool, AuthError> {
        Err(self
            .authenticator
            .change_password(username, old_password, new_password))
    }

    /// Succeeds when the user was created, already existed, or registration is disabled
    pub async fn add_user(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        self.registrar.add_user(username, password).await.map(|_| true)
    }

    pub async fn allow(
        &self,
        operation: Operation,
        user: &RemoteUser,
        package: &PackageAccess,
    ) -> Result<bool, AuthError> {
        self.access.check(operation, user, package)
    }

    pub async fn allow_access(&self, user: &RemoteUser, package: &PackageAccess) -> Result<bool, AuthError> {
        self.access.can_access(user, package)
    }

    pub async fn allow_publish(&self, user: &RemoteUser, package: &PackageAccess) -> Result<bool, AuthError> {
        self.access.can_publish(user, package)
    }

    pub async fn allow_unpublish(
        &self,
        user: &RemoteUser,
        package: &PackageAccess,
    ) -> Result<bool, AuthError> {
        self.access.can_unpublish(user, package)
    }
}
