//! RBAC data models: identifiers, permissions, roles, bindings and the
//! per-user authorization snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::registry::PermissionKey;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Internal canonical user identifier.
    UserId
);
uuid_id!(
    /// Surrogate role identifier.
    RoleId
);
uuid_id!(
    /// Surrogate permission identifier, used only by binding rows.
    PermissionId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A persisted permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub resource: String,
    pub action: String,
    pub scope: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(key: PermissionKey, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PermissionId::new(),
            resource: key.resource,
            action: key.action,
            scope: key.scope,
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey {
            resource: self.resource.clone(),
            action: self.action.clone(),
            scope: self.scope.clone(),
        }
    }

    pub fn canonical_id(&self) -> String {
        self.key().to_string()
    }

    /// Strict triple match; an absent scope only matches an absent scope.
    pub fn matches(&self, key: &PermissionKey) -> bool {
        self.resource == key.resource && self.action == key.action && self.scope == key.scope
    }
}

/// Input for creating a catalog permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPermission {
    pub key: PermissionKey,
    pub description: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A role with its permission set loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    /// Unique name.
    pub name: String,
    pub description: String,
    /// Templates can only be cloned, never assigned.
    pub is_template: bool,
    /// System roles cannot be deleted or edited through ordinary updates.
    pub is_system: bool,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_assignable(&self) -> bool {
        !self.is_template
    }

    pub fn permission_ids(&self) -> BTreeSet<PermissionId> {
        self.permissions.iter().map(|p| p.id).collect()
    }

    pub fn has_permission(&self, key: &PermissionKey) -> bool {
        self.permissions.iter().any(|p| p.matches(key))
    }
}

/// Input for role creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

impl NewRole {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn template(mut self) -> Self {
        self.is_template = true;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn with_permissions(mut self, ids: impl IntoIterator<Item = PermissionId>) -> Self {
        self.permission_ids = ids.into_iter().collect();
        self
    }
}

/// Partial role update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl RoleChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.permission_ids.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// `(user, role)` is unique; re-granting refreshes the audit fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleBinding {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

/// A direct permission grant; unions with role-derived permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionBinding {
    pub user_id: UserId,
    pub permission_id: PermissionId,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectGrant {
    pub permission: Permission,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

/// Everything bound to one user, read in a single pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAuthorization {
    pub user_id: UserId,
    pub roles: Vec<RoleGrant>,
    pub permissions: Vec<DirectGrant>,
}

impl UserAuthorization {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    /// Union of role permissions and direct grants, as canonical identifiers.
    pub fn effective_permission_ids(&self) -> BTreeSet<String> {
        self.roles
            .iter()
            .flat_map(|grant| grant.role.permissions.iter())
            .chain(self.permissions.iter().map(|grant| &grant.permission))
            .map(Permission::canonical_id)
            .collect()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|g| g.role.name.clone()).collect()
    }
}
