//! Role types for storefront access control.
//!
//! Roles come from two Keycloak namespaces: realm roles
//! (`realm_access.roles`) and roles scoped to this client
//! (`resource_access[<client-id>].roles`). The application only ever sees
//! their union.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role granting catalog and order administration.
pub const ROLE_ADMIN: &str = "ADMIN";

/// Role granted to ordinary shop customers.
pub const ROLE_CLIENT: &str = "CLIENT";

/// Union of realm-level and client-scoped role names.
///
/// Derived from claims on every read; it has no lifecycle of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: BTreeSet<String>,
}

impl RoleSet {
    /// Creates an empty role set (no access).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates the union of realm roles and client roles.
    #[must_use]
    pub fn union<'a, R, C>(realm_roles: R, client_roles: C) -> Self
    where
        R: IntoIterator<Item = &'a String>,
        C: IntoIterator<Item = &'a String>,
    {
        let roles = realm_roles
            .into_iter()
            .chain(client_roles)
            .cloned()
            .collect();
        Self { roles }
    }

    /// Returns true if the set contains `role` (exact, case-sensitive match).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns true if the user has the `ADMIN` role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    /// Returns true if the user has the `CLIENT` or the `ADMIN` role.
    ///
    /// Whether this means "any shop user" or "holds one of these two roles"
    /// is unresolved; the check is kept literal.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.has_role(ROLE_CLIENT) || self.has_role(ROLE_ADMIN)
    }

    /// Returns true if there are no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the number of distinct roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Iterates the role names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn none_has_no_roles() {
        let roles = RoleSet::none();
        assert!(roles.is_empty());
        assert!(!roles.is_admin());
        assert!(!roles.is_user());
    }

    #[test]
    fn union_merges_both_namespaces() {
        let realm = set(&["CLIENT"]);
        let client = set(&["ADMIN"]);

        let roles = RoleSet::union(&realm, &client);

        assert_eq!(roles.iter().collect::<Vec<_>>(), vec!["ADMIN", "CLIENT"]);
        assert!(roles.is_admin());
        assert!(roles.is_user());
    }

    #[test]
    fn union_collapses_duplicates() {
        let realm = set(&["CLIENT", "offline_access"]);
        let client = set(&["CLIENT"]);

        let roles = RoleSet::union(&realm, &client);

        assert_eq!(roles.len(), 2);
    }

    #[test]
    fn client_role_is_user_not_admin() {
        let roles: RoleSet = ["CLIENT"].into_iter().collect();
        assert!(roles.is_user());
        assert!(!roles.is_admin());
    }

    #[test]
    fn admin_alone_counts_as_user() {
        let roles: RoleSet = ["ADMIN"].into_iter().collect();
        assert!(roles.is_user());
        assert!(roles.is_admin());
    }

    #[test]
    fn role_match_is_case_sensitive() {
        let roles: RoleSet = ["admin", "client"].into_iter().collect();
        assert!(!roles.is_admin());
        assert!(!roles.is_user());
    }

    #[test]
    fn unrelated_roles_grant_nothing() {
        let roles: RoleSet = ["offline_access", "uma_authorization"].into_iter().collect();
        assert!(!roles.is_empty());
        assert!(!roles.is_user());
    }

    #[test]
    fn role_set_serializes_as_sorted_list() {
        let roles: RoleSet = ["CLIENT", "ADMIN"].into_iter().collect();
        let json = serde_json::to_string(&roles).expect("serialize");
        assert_eq!(json, r#"["ADMIN","CLIENT"]"#);
    }
}
