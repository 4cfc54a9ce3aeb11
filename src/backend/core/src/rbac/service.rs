//! Role and permission administration.
//!
//! All catalog mutations go through [`RoleService`], which enforces the role
//! invariants before touching the store:
//!
//! - templates are never assigned to users
//! - system roles are never deleted or edited
//! - `is_template` / `is_system` are fixed at creation
//! - a role cloned from a template is neither, and copies the template's
//!   permission set by value

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::models::{
    NewRole, Permission, PermissionId, Role, RoleChanges, RoleGrant, RoleId, UserAuthorization,
    UserId, UserPermissionBinding, UserRoleBinding,
};
use super::store::AuthzStore;
use crate::error::{Result, ScribeError};

pub const MAX_ROLE_NAME_LEN: usize = 100;

#[derive(Clone)]
pub struct RoleService {
    store: Arc<dyn AuthzStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role catalog
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_role(
        &self,
        name: &str,
        description: &str,
        is_template: bool,
    ) -> Result<Role> {
        self.create_role_with_permissions(name, description, is_template, &[])
            .await
    }

    /// Create a role with an initial permission set in one transaction.
    pub async fn create_role_with_permissions(
        &self,
        name: &str,
        description: &str,
        is_template: bool,
        permission_ids: &[PermissionId],
    ) -> Result<Role> {
        let name = validate_role_name(name)?;
        let ids = dedup(permission_ids);

        let mut new = NewRole::new(name, description).with_permissions(ids);
        new.is_template = is_template;

        let role = self.store.create_role(new).await?;
        info!(role_id = %role.id, role = %role.name, is_template, "Role created");
        Ok(role)
    }

    pub async fn create_role_from_template(
        &self,
        template_id: RoleId,
        name: &str,
        description: &str,
    ) -> Result<Role> {
        let template = self.store.get_role(template_id).await?;
        if !template.is_template {
            return Err(ScribeError::not_a_template(template.name));
        }
        let name = validate_role_name(name)?;

        let new = NewRole::new(name, description).with_permissions(template.permission_ids());
        let role = self.store.create_role(new).await?;

        info!(
            role_id = %role.id,
            role = %role.name,
            template = %template.name,
            "Role cloned from template"
        );
        Ok(role)
    }

    pub async fn update_role(
        &self,
        id: RoleId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Role> {
        let role = self.store.get_role(id).await?;
        if role.is_system {
            return Err(ScribeError::cannot_update_system_role(role.name));
        }

        let changes = RoleChanges {
            name: name.map(validate_role_name).transpose()?,
            description: description.map(str::to_string),
            permission_ids: None,
        };
        if changes.is_empty() {
            return Ok(role);
        }

        let updated = self.store.update_role(id, changes).await?;
        info!(role_id = %id, role = %updated.name, "Role updated");
        Ok(updated)
    }

    /// Replace the permission set atomically after checking every id exists.
    pub async fn update_role_permissions(
        &self,
        id: RoleId,
        permission_ids: &[PermissionId],
    ) -> Result<Role> {
        let role = self.store.get_role(id).await?;
        if role.is_system {
            return Err(ScribeError::cannot_update_system_role(role.name));
        }

        let ids = dedup(permission_ids);
        for permission_id in &ids {
            self.store.get_permission(*permission_id).await?;
        }

        let updated = self
            .store
            .update_role(
                id,
                RoleChanges {
                    permission_ids: Some(ids),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            role_id = %id,
            permissions = updated.permissions.len(),
            "Role permissions replaced"
        );
        Ok(updated)
    }

    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        let role = self.store.get_role(id).await?;
        if role.is_system {
            return Err(ScribeError::cannot_delete_system_role(role.name));
        }

        self.store.delete_role(id).await?;
        info!(role_id = %id, role = %role.name, "Role deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User bindings
    // ─────────────────────────────────────────────────────────────────────────

    /// Assign an existing, assignable role. Re-assigning refreshes the audit
    /// fields.
    pub async fn assign_role_to_user(
        &self,
        user_id: UserId,
        role_id: RoleId,
        granted_by: Option<UserId>,
    ) -> Result<()> {
        let role = self.store.get_role(role_id).await?;
        if !role.is_assignable() {
            return Err(ScribeError::template_cannot_assign(role.name));
        }

        self.store
            .assign_role(UserRoleBinding {
                user_id,
                role_id,
                granted_by,
                granted_at: Utc::now(),
            })
            .await?;

        info!(user_id = %user_id, role_id = %role_id, role = %role.name, "Role assigned");
        Ok(())
    }

    pub async fn remove_role_from_user(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        self.store.remove_role(user_id, role_id).await?;
        info!(user_id = %user_id, role_id = %role_id, "Role removed");
        Ok(())
    }

    /// Validate every role first, then swap the whole set in one transaction.
    pub async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
        granted_by: Option<UserId>,
    ) -> Result<()> {
        let role_ids = dedup(role_ids);
        for role_id in &role_ids {
            let role = self.store.get_role(*role_id).await?;
            if !role.is_assignable() {
                return Err(ScribeError::template_cannot_assign(role.name));
            }
        }

        self.store
            .replace_user_roles(user_id, &role_ids, granted_by)
            .await?;

        info!(user_id = %user_id, roles = role_ids.len(), "User roles replaced");
        Ok(())
    }

    pub async fn grant_permission_to_user(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        granted_by: Option<UserId>,
    ) -> Result<()> {
        let permission = self.store.get_permission(permission_id).await?;

        self.store
            .grant_permission(UserPermissionBinding {
                user_id,
                permission_id,
                granted_by,
                granted_at: Utc::now(),
            })
            .await?;

        info!(
            user_id = %user_id,
            permission = %permission.canonical_id(),
            "Permission granted"
        );
        Ok(())
    }

    pub async fn revoke_permission_from_user(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> Result<()> {
        self.store.revoke_permission(user_id, permission_id).await?;
        info!(user_id = %user_id, permission_id = %permission_id, "Permission revoked");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_all_permissions(&self) -> Result<Vec<Permission>> {
        self.store.list_permissions().await
    }

    pub async fn get_permission(&self, id: PermissionId) -> Result<Permission> {
        self.store.get_permission(id).await
    }

    pub async fn get_all_roles(&self) -> Result<Vec<Role>> {
        self.store.list_roles().await
    }

    pub async fn list_templates(&self) -> Result<Vec<Role>> {
        self.store.list_templates().await
    }

    pub async fn get_role(&self, id: RoleId) -> Result<Role> {
        self.store.get_role(id).await
    }

    /// Roles bound to `user_id` with their permissions and grant audit.
    pub async fn get_user_roles_with_details(&self, user_id: UserId) -> Result<Vec<RoleGrant>> {
        Ok(self.store.user_authorization(user_id).await?.roles)
    }

    pub async fn get_user_authorization(&self, user_id: UserId) -> Result<UserAuthorization> {
        self.store.user_authorization(user_id).await
    }
}

fn validate_role_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ScribeError::validation("Role name must not be empty")
            .with_context("field", "name"));
    }
    if name.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(ScribeError::validation(format!(
            "Role name must be at most {} characters",
            MAX_ROLE_NAME_LEN
        ))
        .with_context("field", "name"));
    }
    Ok(name.to_string())
}

/// Drop duplicates, keeping first-seen order.
fn dedup<T: Copy + Ord>(ids: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
