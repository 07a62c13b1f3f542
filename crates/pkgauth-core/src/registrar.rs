//! Self-service user registration

use pkgauth_auth::{AuthError, PasswordCodec};
use pkgauth_db::{Document, DocumentStore, Filter, Projection};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::authenticator::DEFAULT_GROUP;
use crate::config::{Configuration, FieldNames};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// What a successful registration call actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new user record was written
    Created,
    /// A user with that name already exists; nothing was written
    AlreadyExisted,
    /// Registration is switched off; the store was not touched
    Disabled,
}

impl Registration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Registration::Created => "created",
            Registration::AlreadyExisted => "already_existed",
            Registration::Disabled => "disabled",
        }
    }
}

/// Validate credentials before any store access
///
/// Lengths are counted in characters, not bytes.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), AuthError> {
    if username.chars().count() < MIN_USERNAME_LENGTH {
        return Err(AuthError::BadData(format!(
            "Bad username, username is too short (min {} characters)!",
            MIN_USERNAME_LENGTH
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::BadData(format!(
            "Bad password, password is too short (min {} characters)!",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Creates user records
pub struct Registrar {
    store: Arc<dyn DocumentStore>,
    codec: Arc<dyn PasswordCodec>,
    collection: String,
    fields: FieldNames,
    allow_registration: bool,
    enforce_unique: bool,
    unique_index: OnceCell<()>,
}

impl Registrar {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        codec: Arc<dyn PasswordCodec>,
        config: &Configuration,
    ) -> Self {
        Self {
            store,
            codec,
            collection: config.user_collection.clone(),
            fields: config.fields.clone(),
            allow_registration: config.allow_registration,
            enforce_unique: config.enforce_unique_username,
            unique_index: OnceCell::new(),
        }
    }

    /// Register a new user in its own group and the default group
    pub async fn add_user(&self, username: &str, password: &str) -> Result<Registration, AuthError> {
        let result = self.register(username, password).await;
        let outcome = match &result {
            Ok(registration) => registration.as_str(),
            Err(AuthError::BadData(_)) => "rejected",
            Err(_) => "error",
        };
        metrics::counter!("pkgauth_registrations_total", "outcome" => outcome).increment(1);
        result
    }

    async fn register(&self, username: &str, password: &str) -> Result<Registration, AuthError> {
        validate_credentials(username, password)?;

        if !self.allow_registration {
            warn!("Registration is disabled, not adding user '{}'", username);
            return Ok(Registration::Disabled);
        }

        if self.enforce_unique {
            self.ensure_unique_index().await;
            if self.exists(username).await? {
                info!("User '{}' already exists, not adding", username);
                return Ok(Registration::AlreadyExisted);
            }
        }

        let digest = self.hash(password).await?;
        let mut document = Document::new();
        document.insert(self.fields.username.clone(), Value::String(username.to_string()));
        document.insert(self.fields.password.clone(), Value::String(digest));
        document.insert(
            self.fields.groups.clone(),
            Value::Array(vec![
                Value::String(username.to_string()),
                Value::String(DEFAULT_GROUP.to_string()),
            ]),
        );

        match self.store.insert_one(&self.collection, document).await {
            Ok(()) => {
                info!("Added user '{}'", username);
                Ok(Registration::Created)
            }
            Err(e) if e.is_duplicate() => {
                info!("User '{}' was registered concurrently, not adding", username);
                Ok(Registration::AlreadyExisted)
            }
            Err(e) => {
                error!("Failed to add user '{}': {}", username, e);
                Err(AuthError::Internal(format!(
                    "Error with adding user to the store: {}",
                    e
                )))
            }
        }
    }

    async fn exists(&self, username: &str) -> Result<bool, AuthError> {
        let found = self
            .store
            .find_one(
                &self.collection,
                &Filter::eq(&self.fields.username, username),
                &Projection::new([self.fields.username.as_str()]),
            )
            .await
            .map_err(|e| {
                error!("Existence check for '{}' failed: {}", username, e);
                AuthError::Internal(format!("Error with checking user in the store: {}", e))
            })?;
        Ok(found.is_some())
    }

    /// Create the unique username index once; failures are retried on the next call
    async fn ensure_unique_index(&self) {
        let result = self
            .unique_index
            .get_or_try_init(|| async {
                self.store
                    .ensure_unique_index(&self.collection, &self.fields.username)
                    .await
            })
            .await;

        if let Err(e) = result {
            warn!(
                "Could not create unique index on {}.{}: {}",
                self.collection, self.fields.username, e
            );
        } else {
            debug!("Unique index on {}.{} in place", self.collection, self.fields.username);
        }
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let codec = self.codec.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || codec.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))?
    }
}
