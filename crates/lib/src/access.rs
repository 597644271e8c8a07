//! # Role-Access Resolution
//!
//! Maps a caller's role to what it may see. The privileged role sees everything,
//! the shared role sees only shared content, and any other role sees its own
//! content plus shared content. Role names compare case-insensitively.

use crate::registry::{list_registrations, RegistryError};
use core_access::{is_general, is_privileged, GENERAL_ROLE};
use std::collections::BTreeSet;
use tracing::debug;
use turso::Database;

/// The set of owning roles whose tables and documents a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    /// No restriction.
    All,
    /// Only content owned by one of these roles (lower-cased).
    Roles(Vec<String>),
}

impl RoleScope {
    /// Returns true if content owned by `owner` is visible in this scope.
    pub fn includes(&self, owner: &str) -> bool {
        match self {
            RoleScope::All => true,
            RoleScope::Roles(roles) => roles.iter().any(|r| r.eq_ignore_ascii_case(owner)),
        }
    }

    /// The role list for a SQL filter, or `None` when unrestricted.
    pub fn as_filter(&self) -> Option<&[String]> {
        match self {
            RoleScope::All => None,
            RoleScope::Roles(roles) => Some(roles),
        }
    }
}

/// Computes the visibility scope of `role`.
pub fn visible_roles(role: &str) -> RoleScope {
    let role = role.trim();
    if is_privileged(role) {
        RoleScope::All
    } else if is_general(role) {
        RoleScope::Roles(vec![GENERAL_ROLE.to_lowercase()])
    } else {
        RoleScope::Roles(vec![role.to_lowercase(), GENERAL_ROLE.to_lowercase()])
    }
}

/// Returns the names of the tables `role` may query.
///
/// Reads the registry on every call; the result is never cached.
pub async fn allowed_tables(
    tabular_db: &Database,
    role: &str,
) -> Result<BTreeSet<String>, RegistryError> {
    let scope = visible_roles(role);
    let allowed: BTreeSet<String> = list_registrations(tabular_db)
        .await?
        .into_iter()
        .filter(|registration| scope.includes(&registration.role))
        .map(|registration| registration.table_name)
        .collect();
    debug!(role = %role, tables = ?allowed, "Resolved allowed tables.");
    Ok(allowed)
}
