//! User and Permission Entities

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named capability grant, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Opaque PHC-format password hash. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// UUID v4 assigned at registration
    pub id: String,

    pub email: String,

    /// Absent when the record was loaded without credentials
    pub password_hash: Option<PasswordHash>,

    pub permissions: BTreeSet<Permission>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            password_hash: None,
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_password_hash(mut self, hash: PasswordHash) -> Self {
        self.password_hash = Some(hash);
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(Permission::new(permission));
        self
    }

    pub fn grant_permission(&mut self, permission: impl Into<String>) -> bool {
        self.permissions.insert(Permission::new(permission))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p.name == permission)
    }

    /// Credential-free copy for handing across process boundaries.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id.clone(),
            email: self.email.clone(),
            permissions: self.permissions.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

/// Value copy of a user as carried in work items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_are_unique_and_ordered() {
        let mut user = User::new("u-1", "ann@example.com")
            .with_permission("identity:write")
            .with_permission("identity:read");

        assert!(!user.grant_permission("identity:read"));
        let names: Vec<_> = user.permissions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["identity:read", "identity:write"]);
        assert!(user.has_permission("identity:write"));
        assert!(!user.has_permission("admin"));
    }

    #[test]
    fn test_snapshot_excludes_password_hash() {
        let user = User::new("u-1", "ann@example.com")
            .with_password_hash(PasswordHash::new("$argon2id$v=19$secret-material"));

        let json = serde_json::to_string(&user.snapshot()).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("ann@example.com"));
    }

    #[test]
    fn test_debug_redacts_hash() {
        let user = User::new("u-1", "ann@example.com")
            .with_password_hash(PasswordHash::new("$argon2id$v=19$secret-material"));

        assert!(!format!("{:?}", user).contains("secret-material"));
    }
}
