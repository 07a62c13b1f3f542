//! Package access control
//!
//! Decides whether a (possibly anonymous) user may access, publish, or
//! unpublish a package, according to the role mode configured for the
//! operation. Members of the admin group are always allowed.

use pkgauth_auth::AuthError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::activity::ActivityRecorder;
use crate::config::{Configuration, Operation, RoleMode, RoleModes};

/// The user a request is made on behalf of
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Absent for anonymous requests
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl RemoteUser {
    pub fn new(name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            groups,
        }
    }

    pub fn anonymous(groups: Vec<String>) -> Self {
        Self { name: None, groups }
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous user")
    }

    fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Per-package access lists from the host's package configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAccess {
    pub name: String,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub publish: Vec<String>,
}

impl PackageAccess {
    /// Entries consulted for an operation; unpublish shares the publish list
    pub fn list_for(&self, operation: Operation) -> &[String] {
        match operation {
            Operation::Access => &self.access,
            Operation::Publish | Operation::Unpublish => &self.publish,
        }
    }
}

/// Unique elements of `left` that also appear in `right`, in `left` order
pub fn intersect(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|item| right.contains(item.as_str()) && seen.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Role-based access decisions
pub struct AccessController {
    roles: RoleModes,
    admin_group: String,
    activity: ActivityRecorder,
}

impl AccessController {
    pub fn new(config: &Configuration, activity: ActivityRecorder) -> Self {
        Self {
            roles: config.roles,
            admin_group: config.admin_group.clone(),
            activity,
        }
    }

    /// Decide without side effects
    pub fn decide(
        &self,
        operation: Operation,
        user: &RemoteUser,
        package: &PackageAccess,
    ) -> Result<(), AuthError> {
        let mode = self.roles.for_operation(operation);

        let has_role = match mode {
            RoleMode::Maintainer | RoleMode::Contributor => user.in_group(&package.name),
            RoleMode::User => {
                let allowed = package.list_for(operation);
                let by_name = user
                    .name
                    .as_deref()
                    .is_some_and(|name| allowed.iter().any(|entry| entry == name));
                by_name || !intersect(&user.groups, allowed).is_empty()
            }
        };

        if has_role || user.in_group(&self.admin_group) {
            return Ok(());
        }

        Err(AuthError::Forbidden(format!(
            "User {} is not allowed to {} the package {} - only {}s are!",
            user.display_name(),
            operation,
            package.name,
            mode
        )))
    }

    /// Decide, log, and record activity for granted operations
    pub fn check(
        &self,
        operation: Operation,
        user: &RemoteUser,
        package: &PackageAccess,
    ) -> Result<bool, AuthError> {
        match self.decide(operation, user, package) {
            Ok(()) => {
                info!(
                    "{} granted {} on {}",
                    user.display_name(),
                    operation,
                    package.name
                );
                record_decision(operation, "allow");
                self.activity
                    .record(operation, user.name.as_deref(), &package.name);
                Ok(true)
            }
            Err(e) => {
                warn!("{}", e);
                record_decision(operation, "deny");
                Err(e)
            }
        }
    }

    pub fn can_access(&self, user: &RemoteUser, package: &PackageAccess) -> Result<bool, AuthError> {
        self.check(Operation::Access, user, package)
    }

    pub fn can_publish(&self, user: &RemoteUser, package: &PackageAccess) -> Result<bool, AuthError> {
        self.check(Operation::Publish, user, package)
    }

    pub fn can_unpublish(&self, user: &RemoteUser, package: &PackageAccess) -> Result<bool, AuthError> {
        self.check(Operation::Unpublish, user, package)
    }
}

fn record_decision(operation: Operation, decision: &'static str) {
    metrics::counter!(
        "pkgauth_access_decisions_total",
        "operation" => operation.as_str(),
        "decision" => decision
    )
    .increment(1);
}
