//! The permission registry: the compiled-in vocabulary of valid permission
//! identifiers.
//!
//! The registry is the source of truth for which canonical identifiers exist.
//! Database rows in `permissions` mirror it (see [`crate::rbac::seed`]) so that
//! bindings have something to reference, but the table never decides validity.
//!
//! Identifiers have the shape `resource:action` or `resource:action:scope`.
//! Four-segment identifiers fold the middle two segments into the action, so
//! `posts:read:draft:own` is `(posts, read:draft, own)`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Result, ScribeError};

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Constants
// ═══════════════════════════════════════════════════════════════════════════════

pub mod perms {
    // Posts
    pub const POSTS_CREATE: &str = "posts:create";
    pub const POSTS_READ_PUBLISHED: &str = "posts:read:published";
    pub const POSTS_READ_DRAFT_OWN: &str = "posts:read:draft:own";
    pub const POSTS_READ_DRAFT_ANY: &str = "posts:read:draft:any";
    pub const POSTS_UPDATE_OWN: &str = "posts:update:own";
    pub const POSTS_UPDATE_ANY: &str = "posts:update:any";
    pub const POSTS_DELETE_OWN: &str = "posts:delete:own";
    pub const POSTS_DELETE_ANY: &str = "posts:delete:any";
    pub const POSTS_PUBLISH_OWN: &str = "posts:publish:own";
    pub const POSTS_PUBLISH_ANY: &str = "posts:publish:any";

    // Themes
    pub const THEMES_CREATE: &str = "themes:create";
    pub const THEMES_READ: &str = "themes:read";
    pub const THEMES_UPDATE_OWN: &str = "themes:update:own";
    pub const THEMES_UPDATE_ANY: &str = "themes:update:any";
    pub const THEMES_DELETE_OWN: &str = "themes:delete:own";
    pub const THEMES_DELETE_ANY: &str = "themes:delete:any";

    // Users
    pub const USERS_READ_SELF: &str = "users:read:self";
    pub const USERS_READ_ANY: &str = "users:read:any";
    pub const USERS_UPDATE_SELF: &str = "users:update:self";
    pub const USERS_UPDATE_ANY: &str = "users:update:any";
    pub const USERS_DELETE_ANY: &str = "users:delete:any";

    // Authorization administration
    pub const AUTHZ_PERMISSIONS_READ: &str = "authz:permissions:read";
    pub const AUTHZ_ROLES_READ: &str = "authz:roles:read";
    pub const AUTHZ_ROLES_CREATE: &str = "authz:roles:create";
    pub const AUTHZ_ROLES_UPDATE: &str = "authz:roles:update";
    pub const AUTHZ_ROLES_DELETE: &str = "authz:roles:delete";
    pub const AUTHZ_USERS_READ: &str = "authz:users:read";
    pub const AUTHZ_USERS_ASSIGN: &str = "authz:users:assign";
    pub const AUTHZ_USERS_REVOKE: &str = "authz:users:revoke";
}

/// Built-in catalog: canonical identifier and description.
const CATALOG: &[(&str, &str)] = &[
    (perms::POSTS_CREATE, "Create new posts"),
    (perms::POSTS_READ_PUBLISHED, "Read published posts"),
    (perms::POSTS_READ_DRAFT_OWN, "Read own draft posts"),
    (perms::POSTS_READ_DRAFT_ANY, "Read any draft post"),
    (perms::POSTS_UPDATE_OWN, "Update own posts"),
    (perms::POSTS_UPDATE_ANY, "Update any post"),
    (perms::POSTS_DELETE_OWN, "Delete own posts"),
    (perms::POSTS_DELETE_ANY, "Delete any post"),
    (perms::POSTS_PUBLISH_OWN, "Publish own posts"),
    (perms::POSTS_PUBLISH_ANY, "Publish any post"),
    (perms::THEMES_CREATE, "Create themes"),
    (perms::THEMES_READ, "Read themes"),
    (perms::THEMES_UPDATE_OWN, "Update own themes"),
    (perms::THEMES_UPDATE_ANY, "Update any theme"),
    (perms::THEMES_DELETE_OWN, "Delete own themes"),
    (perms::THEMES_DELETE_ANY, "Delete any theme"),
    (perms::USERS_READ_SELF, "Read own profile"),
    (perms::USERS_READ_ANY, "Read any user profile"),
    (perms::USERS_UPDATE_SELF, "Update own profile"),
    (perms::USERS_UPDATE_ANY, "Update any user profile"),
    (perms::USERS_DELETE_ANY, "Delete any user"),
    (perms::AUTHZ_PERMISSIONS_READ, "List the permission catalog"),
    (perms::AUTHZ_ROLES_READ, "Read roles"),
    (perms::AUTHZ_ROLES_CREATE, "Create roles"),
    (perms::AUTHZ_ROLES_UPDATE, "Update roles and their permissions"),
    (perms::AUTHZ_ROLES_DELETE, "Delete roles"),
    (perms::AUTHZ_USERS_READ, "Read user role assignments"),
    (perms::AUTHZ_USERS_ASSIGN, "Assign roles and permissions to users"),
    (perms::AUTHZ_USERS_REVOKE, "Revoke roles and permissions from users"),
];

static GLOBAL: LazyLock<PermissionRegistry> = LazyLock::new(|| {
    PermissionRegistry::from_entries(CATALOG).expect("built-in permission catalog is well-formed")
});

/// The process-wide registry built from the compiled-in catalog.
pub fn registry() -> &'static PermissionRegistry {
    &GLOBAL
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Key
// ═══════════════════════════════════════════════════════════════════════════════

pub const SCOPE_OWN: &str = "own";
pub const SCOPE_SELF: &str = "self";
pub const SCOPE_ANY: &str = "any";

/// A parsed `(resource, action, scope)` triple.
///
/// The empty key (all fields empty) stands for an unparsable identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource: String,
    pub action: String,
    pub scope: Option<String>,
}

impl PermissionKey {
    pub fn new(
        resource: impl Into<String>,
        action: impl Into<String>,
        scope: Option<impl Into<String>>,
    ) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            scope: scope.map(Into::into),
        }
    }

    /// Split a canonical identifier into its triple.
    ///
    /// Malformed input (empty segments, trailing colon, fewer than two or more
    /// than four segments) yields the empty key.
    pub fn parse(id: &str) -> Self {
        let segments: Vec<&str> = id.split(':').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Self::default();
        }

        match segments.as_slice() {
            [resource, action] => Self::new(*resource, *action, None::<String>),
            [resource, action, scope] => Self::new(*resource, *action, Some(*scope)),
            [resource, verb, qualifier, scope] => {
                Self::new(*resource, format!("{}:{}", verb, qualifier), Some(*scope))
            }
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resource.is_empty() && self.action.is_empty() && self.scope.is_none()
    }

    pub fn canonical_id(&self) -> String {
        self.to_string()
    }

    /// True for `own` and `self` scopes.
    pub fn is_ownership_based(&self) -> bool {
        matches!(self.scope.as_deref(), Some(SCOPE_OWN) | Some(SCOPE_SELF))
    }

    pub fn is_global(&self) -> bool {
        self.scope.as_deref() == Some(SCOPE_ANY)
    }

    /// The `:any` form of an ownership-scoped key.
    pub fn any_counterpart(&self) -> Option<Self> {
        if !self.is_ownership_based() {
            return None;
        }
        Some(Self {
            resource: self.resource.clone(),
            action: self.action.clone(),
            scope: Some(SCOPE_ANY.to_string()),
        })
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "{}:{}", self.resource, self.action)?;
        if let Some(ref scope) = self.scope {
            write!(f, ":{}", scope)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredPermission {
    pub id: String,
    pub key: PermissionKey,
    pub description: String,
}

/// Immutable catalog keyed by canonical identifier.
#[derive(Debug)]
pub struct PermissionRegistry {
    entries: Vec<RegisteredPermission>,
    index: HashMap<String, usize>,
}

impl PermissionRegistry {
    /// Build a registry, rejecting duplicate or unparsable identifiers.
    pub fn from_entries(entries: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
        };

        for (id, description) in entries {
            let key = PermissionKey::parse(id);
            if key.is_empty() {
                return Err(ScribeError::invalid_permission(*id)
                    .wrap("malformed identifier in permission catalog"));
            }
            if registry.index.contains_key(*id) {
                return Err(ScribeError::internal(format!(
                    "duplicate permission in catalog: {}",
                    id
                )));
            }
            registry.index.insert(id.to_string(), registry.entries.len());
            registry.entries.push(RegisteredPermission {
                id: id.to_string(),
                key,
                description: description.to_string(),
            });
        }

        Ok(registry)
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn from_id(&self, id: &str) -> Option<&RegisteredPermission> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    /// Every registered permission, in catalog order.
    pub fn all(&self) -> &[RegisteredPermission] {
        &self.entries
    }

    pub fn by_resource<'a>(
        &'a self,
        resource: &'a str,
    ) -> impl Iterator<Item = &'a RegisteredPermission> + 'a {
        self.entries.iter().filter(move |p| p.key.resource == resource)
    }

    pub fn is_ownership_based(&self, id: &str) -> bool {
        self.from_id(id)
            .map(|p| p.key.is_ownership_based())
            .unwrap_or(false)
    }

    pub fn is_global(&self, id: &str) -> bool {
        self.from_id(id).map(|p| p.key.is_global()).unwrap_or(false)
    }

    pub fn parse(&self, id: &str) -> PermissionKey {
        PermissionKey::parse(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `id`, failing with `InvalidPermission` when unregistered.
    pub fn require(&self, id: &str) -> Result<&RegisteredPermission> {
        self.from_id(id)
            .ok_or_else(|| ScribeError::invalid_permission(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_two_segments() {
        let key = PermissionKey::parse("posts:create");
        assert_eq!(key.resource, "posts");
        assert_eq!(key.action, "create");
        assert_eq!(key.scope, None);
    }

    #[test]
    fn test_parse_three_segments() {
        let key = PermissionKey::parse("posts:update:own");
        assert_eq!(key.action, "update");
        assert_eq!(key.scope.as_deref(), Some("own"));
        assert!(key.is_ownership_based());
    }

    #[test]
    fn test_parse_four_segments_folds_action() {
        let key = PermissionKey::parse("posts:read:draft:own");
        assert_eq!(key.resource, "posts");
        assert_eq!(key.action, "read:draft");
        assert_eq!(key.scope.as_deref(), Some("own"));
    }

    #[test]
    fn test_parse_malformed_is_empty() {
        for id in ["", "posts", "posts:", ":create", "posts::own", "a:b:c:d:e", "posts:update:"] {
            assert!(PermissionKey::parse(id).is_empty(), "{id} should not parse");
        }
    }

    #[test]
    fn test_any_counterpart() {
        let own = PermissionKey::parse("users:update:self");
        assert_eq!(own.any_counterpart().unwrap().to_string(), "users:update:any");
        assert!(PermissionKey::parse("posts:create").any_counterpart().is_none());
    }

    #[test]
    fn test_every_catalog_entry_reassembles() {
        for entry in registry().all() {
            assert_eq!(PermissionKey::parse(&entry.id).to_string(), entry.id);
            assert_eq!(entry.key.canonical_id(), entry.id);
        }
    }

    #[test]
    fn test_registry_queries() {
        let reg = registry();
        assert!(reg.is_valid("posts:update:own"));
        assert!(!reg.is_valid("widgets:frobnicate"));
        assert!(reg.is_ownership_based("users:read:self"));
        assert!(!reg.is_ownership_based("posts:update:any"));
        assert!(reg.is_global("posts:delete:any"));
        assert!(!reg.is_global("posts:create"));
        assert_eq!(reg.by_resource("themes").count(), 6);
        assert_eq!(reg.all().first().map(|p| p.id.as_str()), Some("posts:create"));
    }

    #[test]
    fn test_require_unknown_is_invalid_permission() {
        let err = registry().require("widgets:frobnicate").unwrap_err();
        assert!(err.is(ErrorCode::InvalidPermission));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = PermissionRegistry::from_entries(&[
            ("posts:create", "a"),
            ("posts:create", "b"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_registration_rejected() {
        let err = PermissionRegistry::from_entries(&[("posts:", "bad")]).unwrap_err();
        assert!(err.is(ErrorCode::InvalidPermission));
    }
}
