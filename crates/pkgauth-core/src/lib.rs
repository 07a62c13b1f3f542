//! pkgauth Core Business Logic
//!
//! This crate provides the authentication, registration, and package
//! access-control logic of pkgauth, along with plugin configuration
//! resolution and optional per-package activity counting.

pub mod access;
pub mod activity;
pub mod authenticator;
pub mod config;
pub mod error;
pub mod plugin;
pub mod registrar;

#[cfg(test)]
mod test_support;

pub use access::{AccessController, PackageAccess, RemoteUser, intersect};
pub use activity::ActivityRecorder;
pub use authenticator::{Authenticator, DEFAULT_GROUP};
pub use config::{
    Configuration, FieldNames, FieldsConfig, Operation, PluginConfig, RoleMode, RoleModes,
    RolesConfig,
};
pub use error::CoreError;
pub use plugin::AuthPlugin;
pub use registrar::{Registrar, Registration, validate_credentials};
