//! Plugin configuration
//!
//! [`PluginConfig`] is the raw, partially-specified form read from the host
//! config file. [`PluginConfig::resolve`] validates it and fills in defaults,
//! producing the immutable [`Configuration`] every other component reads.

use pkgauth_auth::CacheSettings;
use pkgauth_db::utils::{redact_uri, validate_identifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::CoreError;

pub const DEFAULT_USERNAME_FIELD: &str = "username";
pub const DEFAULT_PASSWORD_FIELD: &str = "password";
pub const DEFAULT_GROUPS_FIELD: &str = "usergroups";
pub const DEFAULT_PACKAGE_NAME_FIELD: &str = "packagename";
pub const DEFAULT_ADMIN_GROUP: &str = "__admin__";

const MISSING_REQUIRED_MESSAGE: &str =
    r#"must specify "store_uri", "database_name", and "user_collection" in config"#;

/// Error type for parsing role modes and operations
#[derive(Debug, Clone)]
pub struct ParseValueError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for ParseValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseValueError {}

/// How an operation is authorized for a package
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoleMode {
    /// Match the user's name or groups against the package's configured list
    #[default]
    User,
    /// Require a group named exactly like the package
    Maintainer,
    /// Same rule as `Maintainer`
    Contributor,
}

impl RoleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleMode::User => "user",
            RoleMode::Maintainer => "maintainer",
            RoleMode::Contributor => "contributor",
        }
    }
}

impl fmt::Display for RoleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleMode {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(RoleMode::User),
            "maintainer" => Ok(RoleMode::Maintainer),
            "contributor" => Ok(RoleMode::Contributor),
            _ => Err(ParseValueError {
                kind: "role mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Package operations subject to access control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Access,
    Publish,
    Unpublish,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Access, Operation::Publish, Operation::Unpublish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Access => "access",
            Operation::Publish => "publish",
            Operation::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" => Ok(Operation::Access),
            "publish" => Ok(Operation::Publish),
            "unpublish" => Ok(Operation::Unpublish),
            _ => Err(ParseValueError {
                kind: "operation",
                value: s.to_string(),
            }),
        }
    }
}

/// Raw field-name mapping for user and package documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldsConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "usergroups")]
    pub groups: Option<String>,
    #[serde(default, alias = "packagename", alias = "packageName")]
    pub package_name: Option<String>,
}

/// Raw per-operation role modes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub access: Option<RoleMode>,
    #[serde(default)]
    pub publish: Option<RoleMode>,
    #[serde(default)]
    pub unpublish: Option<RoleMode>,
}

/// Plugin configuration as written by the operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Document store connection string (e.g. `sqlite://data/users.db`)
    #[serde(default, alias = "uri", alias = "storeUri")]
    pub store_uri: Option<String>,
    /// Namespace inside the store
    #[serde(default, alias = "db", alias = "databaseName")]
    pub database_name: Option<String>,
    #[serde(default, alias = "collection", alias = "userCollection")]
    pub user_collection: Option<String>,
    /// Collection receiving activity counters
    #[serde(default, alias = "packageCollection")]
    pub package_collection: Option<String>,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default, alias = "rights")]
    pub roles: RolesConfig,
    #[serde(default, alias = "adminGroup")]
    pub admin_group: Option<String>,
    #[serde(default, alias = "allow_add_user", alias = "allowAddUser")]
    pub allow_registration: Option<bool>,
    #[serde(default, alias = "user_is_unique", alias = "userIsUnique")]
    pub enforce_unique_username: Option<bool>,
    #[serde(default, alias = "countActivity")]
    pub count_activity: Option<bool>,
    #[serde(default, alias = "cache_ttl", alias = "cacheTTL")]
    pub cache_ttl_millis: Option<u64>,
    #[serde(default, alias = "cacheMaxEntries")]
    pub cache_max_entries: Option<usize>,
}

/// Resolved document field names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    pub username: String,
    pub password: String,
    pub groups: String,
    pub package_name: String,
}

/// Resolved role mode per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleModes {
    pub access: RoleMode,
    pub publish: RoleMode,
    pub unpublish: RoleMode,
}

impl RoleModes {
    pub fn for_operation(&self, operation: Operation) -> RoleMode {
        match operation {
            Operation::Access => self.access,
            Operation::Publish => self.publish,
            Operation::Unpublish => self.unpublish,
        }
    }
}

/// Fully-resolved plugin configuration
#[derive(Clone, PartialEq)]
pub struct Configuration {
    pub store_uri: String,
    pub database_name: String,
    pub user_collection: String,
    pub package_collection: Option<String>,
    pub fields: FieldNames,
    pub roles: RoleModes,
    pub admin_group: String,
    pub allow_registration: bool,
    pub enforce_unique_username: bool,
    pub count_activity: bool,
    pub cache: CacheSettings,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("store_uri", &redact_uri(&self.store_uri))
            .field("database_name", &self.database_name)
            .field("user_collection", &self.user_collection)
            .field("package_collection", &self.package_collection)
            .field("fields", &self.fields)
            .field("roles", &self.roles)
            .field("admin_group", &self.admin_group)
            .field("allow_registration", &self.allow_registration)
            .field("enforce_unique_username", &self.enforce_unique_username)
            .field("count_activity", &self.count_activity)
            .field("cache", &self.cache)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn or_default<T: fmt::Display>(value: Option<T>, default: T, key: &str) -> T {
    match value {
        Some(v) => v,
        None => {
            warn!("{} was not specified in the config file, using default \"{}\"", key, default);
            default
        }
    }
}

fn string_or_default(value: Option<String>, default: &str, key: &str) -> String {
    or_default(non_empty(value), default.to_string(), key)
}

fn check_identifier(kind: &str, name: &str) -> Result<(), CoreError> {
    validate_identifier(kind, name).map_err(|e| CoreError::Config(e.to_string()))
}

impl PluginConfig {
    /// Validate and fill in defaults
    ///
    /// Fails when any of the store URI, database name, or user collection is
    /// missing, or when a collection or field name is not a valid identifier.
    /// Every other missing value falls back to its default with a warning.
    pub fn resolve(self) -> Result<Configuration, CoreError> {
        let store_uri = non_empty(self.store_uri);
        let database_name = non_empty(self.database_name);
        let user_collection = non_empty(self.user_collection);

        let (Some(store_uri), Some(database_name), Some(user_collection)) =
            (store_uri.clone(), database_name.clone(), user_collection.clone())
        else {
            for (key, value) in [
                ("store_uri", &store_uri),
                ("database_name", &database_name),
                ("user_collection", &user_collection),
            ] {
                if value.is_none() {
                    error!("Required setting \"{}\" is missing from the config file", key);
                }
            }
            return Err(CoreError::Config(MISSING_REQUIRED_MESSAGE.to_string()));
        };

        let fields = FieldNames {
            username: string_or_default(self.fields.username, DEFAULT_USERNAME_FIELD, "fields.username"),
            password: string_or_default(self.fields.password, DEFAULT_PASSWORD_FIELD, "fields.password"),
            groups: string_or_default(self.fields.groups, DEFAULT_GROUPS_FIELD, "fields.groups"),
            package_name: string_or_default(
                self.fields.package_name,
                DEFAULT_PACKAGE_NAME_FIELD,
                "fields.package_name",
            ),
        };

        let roles = RoleModes {
            access: or_default(self.roles.access, RoleMode::User, "roles.access"),
            publish: or_default(self.roles.publish, RoleMode::User, "roles.publish"),
            unpublish: or_default(self.roles.unpublish, RoleMode::User, "roles.unpublish"),
        };

        let admin_group = string_or_default(self.admin_group, DEFAULT_ADMIN_GROUP, "admin_group");
        let allow_registration = or_default(self.allow_registration, false, "allow_registration");
        let enforce_unique_username =
            or_default(self.enforce_unique_username, true, "enforce_unique_username");
        let count_activity = or_default(self.count_activity, false, "count_activity");
        let package_collection = non_empty(self.package_collection);

        if count_activity && package_collection.is_none() {
            debug!("count_activity is enabled but no package_collection is set, skipping activity counts");
        }

        let cache = resolve_cache(self.cache_ttl_millis, self.cache_max_entries);

        check_identifier("database", &database_name)?;
        check_identifier("collection", &user_collection)?;
        if let Some(collection) = &package_collection {
            check_identifier("collection", collection)?;
        }
        for field in [&fields.username, &fields.password, &fields.groups, &fields.package_name] {
            check_identifier("field", field)?;
        }

        let config = Configuration {
            store_uri,
            database_name,
            user_collection,
            package_collection,
            fields,
            roles,
            admin_group,
            allow_registration,
            enforce_unique_username,
            count_activity,
            cache,
        };
        debug!("Resolved plugin configuration: {:?}", config);
        Ok(config)
    }
}

fn resolve_cache(ttl_millis: Option<u64>, max_entries: Option<usize>) -> CacheSettings {
    let defaults = CacheSettings::default();

    let ttl = match ttl_millis {
        Some(0) => {
            warn!("cache_ttl_millis must be positive, using default {:?}", defaults.ttl);
            defaults.ttl
        }
        Some(millis) => Duration::from_millis(millis),
        None => {
            debug!("cache_ttl_millis not set, using default {:?}", defaults.ttl);
            defaults.ttl
        }
    };

    let max_entries = match max_entries {
        Some(n) => NonZeroUsize::new(n).unwrap_or_else(|| {
            warn!(
                "cache_max_entries must be positive, using default {}",
                defaults.max_entries
            );
            defaults.max_entries
        }),
        None => {
            debug!("cache_max_entries not set, using default {}", defaults.max_entries);
            defaults.max_entries
        }
    };

    CacheSettings { ttl, max_entries }
}
