//! Authorization store: persistence of the permission catalog, roles and
//! user bindings.
//!
//! Two query classes live here. Object reads (`get_role`, `user_authorization`)
//! back the admin surface; existence checks (`has_permission` and friends) back
//! the decision hot path and answer in a single round-trip without
//! materializing a user's permission set.
//!
//! Every operation that touches more than one row is atomic: it either applies
//! fully or leaves the store unchanged.

use async_trait::async_trait;

use super::models::{
    NewPermission, NewRole, Permission, PermissionId, Role, RoleChanges, RoleId,
    UserAuthorization, UserId, UserPermissionBinding, UserRoleBinding,
};
use super::registry::PermissionKey;
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryAuthzStore;
pub use postgres::PgAuthzStore;

#[async_trait]
pub trait AuthzStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Permission catalog
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_permission(&self, id: PermissionId) -> Result<Permission>;

    async fn get_permission_by_key(&self, key: &PermissionKey) -> Result<Permission>;

    /// All catalog rows ordered by `(resource, action, scope)`.
    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    /// Insert a catalog row. Idempotent on the triple: an existing row keeps
    /// its id and has its description refreshed.
    async fn create_permission(&self, new: NewPermission) -> Result<Permission>;

    async fn update_permission(&self, id: PermissionId, description: String)
        -> Result<Permission>;

    /// Cascades to role and user bindings.
    async fn delete_permission(&self, id: PermissionId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Role catalog
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_role(&self, id: RoleId) -> Result<Role>;

    async fn get_role_by_name(&self, name: &str) -> Result<Role>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn list_templates(&self) -> Result<Vec<Role>>;

    /// Create a role and its initial permission set in one transaction.
    /// Fails with `RoleNameExists` or `PermissionNotFound`.
    async fn create_role(&self, new: NewRole) -> Result<Role>;

    /// Apply name, description and permission-set changes atomically.
    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role>;

    /// Cascades to role-permission and user-role bindings.
    async fn delete_role(&self, id: RoleId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Role-permission bindings
    // ─────────────────────────────────────────────────────────────────────────

    async fn set_role_permissions(&self, role_id: RoleId, ids: &[PermissionId]) -> Result<()>;

    /// Idempotent.
    async fn add_role_permission(&self, role_id: RoleId, permission_id: PermissionId)
        -> Result<()>;

    async fn remove_role_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // User-role bindings
    // ─────────────────────────────────────────────────────────────────────────

    /// Upsert; re-assignment refreshes `granted_by` and `granted_at`.
    async fn assign_role(&self, binding: UserRoleBinding) -> Result<()>;

    /// Fails with `RoleNotAssigned` when there is nothing to remove.
    async fn remove_role(&self, user_id: UserId, role_id: RoleId) -> Result<()>;

    async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
        granted_by: Option<UserId>,
    ) -> Result<()>;

    async fn user_authorization(&self, user_id: UserId) -> Result<UserAuthorization>;

    // ─────────────────────────────────────────────────────────────────────────
    // Direct user permissions
    // ─────────────────────────────────────────────────────────────────────────

    /// Upsert on `(user, permission)`.
    async fn grant_permission(&self, binding: UserPermissionBinding) -> Result<()>;

    /// Fails with `PermissionNotGranted` when there is nothing to revoke.
    async fn revoke_permission(&self, user_id: UserId, permission_id: PermissionId)
        -> Result<()>;

    /// Returns the number of grants removed.
    async fn clear_user_permissions(&self, user_id: UserId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Hot path
    // ─────────────────────────────────────────────────────────────────────────

    /// Role-derived OR direct grant of exactly this triple. Scope matches
    /// strictly, so an absent scope only matches an absent scope.
    async fn has_permission(&self, user_id: UserId, key: &PermissionKey) -> Result<bool>;

    async fn has_any_permission(&self, user_id: UserId, keys: &[PermissionKey]) -> Result<bool>;

    async fn has_all_permissions(&self, user_id: UserId, keys: &[PermissionKey]) -> Result<bool> {
        for key in keys {
            if !self.has_permission(user_id, key).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn has_role(&self, user_id: UserId, role_name: &str) -> Result<bool>;

    /// Canonical identifiers of the effective permission set, sorted.
    async fn user_permission_ids(&self, user_id: UserId) -> Result<Vec<String>>;

    /// Names of bound roles, sorted.
    async fn user_role_names(&self, user_id: UserId) -> Result<Vec<String>>;
}
