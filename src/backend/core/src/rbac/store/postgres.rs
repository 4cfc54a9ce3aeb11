//! PostgreSQL-backed [`AuthzStore`].
//!
//! Multi-row writes use a `sqlx::Transaction`. A transaction that is dropped
//! without commit rolls back, which is also what happens when the request
//! future driving it is cancelled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::AuthzStore;
use crate::error::{Result, ScribeError, PG_FOREIGN_KEY_VIOLATION};
use crate::rbac::models::{
    DirectGrant, NewPermission, NewRole, Permission, PermissionId, Role, RoleChanges, RoleGrant,
    RoleId, UserAuthorization, UserId, UserPermissionBinding, UserRoleBinding,
};
use crate::rbac::registry::PermissionKey;

const ROLES_NAME_KEY: &str = "roles_name_key";

/// SQL expression rendering a `permissions` row (aliased `p`) as its canonical id.
const CANONICAL_ID_SQL: &str = "p.resource || ':' || p.action || COALESCE(':' || p.scope, '')";

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: Uuid,
    resource: String,
    action: String,
    scope: Option<String>,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: PermissionId(row.id),
            resource: row.resource,
            action: row.action,
            scope: row.scope,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: String,
    is_template: bool,
    is_system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_role(self, permissions: Vec<Permission>) -> Role {
        Role {
            id: RoleId(self.id),
            name: self.name,
            description: self.description,
            is_template: self.is_template,
            is_system: self.is_system,
            permissions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RolePermissionRow {
    role_id: Uuid,
    #[sqlx(flatten)]
    permission: PermissionRow,
}

#[derive(Debug, FromRow)]
struct UserRoleRow {
    #[sqlx(flatten)]
    role: RoleRow,
    granted_by: Option<Uuid>,
    granted_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct UserPermissionRow {
    #[sqlx(flatten)]
    permission: PermissionRow,
    granted_by: Option<Uuid>,
    granted_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ═══════════════════════════════════════════════════════════════════════════════

fn is_constraint(error: &sqlx::Error, constraint: &str) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_FOREIGN_KEY_VIOLATION))
}

/// Map write failures on `roles`/`role_permissions` to catalog errors.
fn role_write_error(error: sqlx::Error, name: &str) -> ScribeError {
    if is_constraint(&error, ROLES_NAME_KEY) {
        return ScribeError::role_name_exists(name).with_source(error);
    }
    if is_foreign_key_violation(&error) {
        return ScribeError::new(
            crate::error::ErrorCode::PermissionNotFound,
            "One or more permissions do not exist",
        )
        .with_source(error);
    }
    ScribeError::from(error)
}

fn binding_error(error: sqlx::Error, missing: impl FnOnce() -> ScribeError) -> ScribeError {
    if is_foreign_key_violation(&error) {
        return missing().with_source(error);
    }
    ScribeError::from(error)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PgAuthzStore {
    pool: PgPool,
}

impl PgAuthzStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn permissions_for_roles(&self, role_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Permission>>> {
        if role_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<RolePermissionRow> = sqlx::query_as(
            r#"
            SELECT rp.role_id, p.id, p.resource, p.action, p.scope, p.description,
                   p.created_at, p.updated_at
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = ANY($1)
            ORDER BY p.resource, p.action, p.scope NULLS FIRST
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.role_id)
                .or_default()
                .push(row.permission.into());
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<RoleRow>) -> Result<Vec<Role>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut permissions = self.permissions_for_roles(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let perms = permissions.remove(&row.id).unwrap_or_default();
                row.into_role(perms)
            })
            .collect())
    }

    async fn replace_role_permissions_tx(
        tx: &mut Transaction<'_, Postgres>,
        role_id: Uuid,
        ids: &[PermissionId],
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut **tx)
            .await?;

        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        if !ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                SELECT $1, unnest($2::uuid[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(&ids)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuthzStore for PgAuthzStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Permission catalog
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_permission(&self, id: PermissionId) -> Result<Permission> {
        let row: Option<PermissionRow> = sqlx::query_as(
            r#"
            SELECT id, resource, action, scope, description, created_at, updated_at
            FROM permissions WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Permission::from)
            .ok_or_else(|| ScribeError::permission_not_found(id))
    }

    async fn get_permission_by_key(&self, key: &PermissionKey) -> Result<Permission> {
        let row: Option<PermissionRow> = sqlx::query_as(
            r#"
            SELECT id, resource, action, scope, description, created_at, updated_at
            FROM permissions
            WHERE resource = $1 AND action = $2 AND scope IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(&key.resource)
        .bind(&key.action)
        .bind(&key.scope)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Permission::from)
            .ok_or_else(|| ScribeError::permission_not_found(key))
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let rows: Vec<PermissionRow> = sqlx::query_as(
            r#"
            SELECT id, resource, action, scope, description, created_at, updated_at
            FROM permissions
            ORDER BY resource, action, scope NULLS FIRST
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        let row: PermissionRow = sqlx::query_as(
            r#"
            INSERT INTO permissions (id, resource, action, scope, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (resource, action, COALESCE(scope, ''))
            DO UPDATE SET description = EXCLUDED.description, updated_at = NOW()
            RETURNING id, resource, action, scope, description, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.key.resource)
        .bind(&new.key.action)
        .bind(&new.key.scope)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        description: String,
    ) -> Result<Permission> {
        let row: Option<PermissionRow> = sqlx::query_as(
            r#"
            UPDATE permissions SET description = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, resource, action, scope, description, created_at, updated_at
            "#,
        )
        .bind(id.0)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Permission::from)
            .ok_or_else(|| ScribeError::permission_not_found(id))
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ScribeError::permission_not_found(id));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role catalog
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_role(&self, id: RoleId) -> Result<Role> {
        let row: Option<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, is_template, is_system, created_at, updated_at
            FROM roles WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| ScribeError::role_not_found(id))?;
        let mut roles = self.hydrate(vec![row]).await?;
        roles.pop().ok_or_else(|| ScribeError::role_not_found(id))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Role> {
        let row: Option<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, is_template, is_system, created_at, updated_at
            FROM roles WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| ScribeError::role_not_found(name))?;
        let mut roles = self.hydrate(vec![row]).await?;
        roles.pop().ok_or_else(|| ScribeError::role_not_found(name))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, is_template, is_system, created_at, updated_at
            FROM roles ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_templates(&self) -> Result<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, is_template, is_system, created_at, updated_at
            FROM roles WHERE is_template ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn create_role(&self, new: NewRole) -> Result<Role> {
        let mut tx = self.pool.begin().await?;

        let row: RoleRow = sqlx::query_as(
            r#"
            INSERT INTO roles (id, name, description, is_template, is_system)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, is_template, is_system, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.is_template)
        .bind(new.is_system)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| role_write_error(e, &new.name))?;

        Self::replace_role_permissions_tx(&mut tx, row.id, &new.permission_ids)
            .await
            .map_err(|e| role_write_error(e, &new.name))?;

        tx.commit().await?;
        debug!(role = %new.name, "Role created");

        self.get_role(RoleId(row.id)).await
    }

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role> {
        let mut tx = self.pool.begin().await?;
        let name = changes.name.clone().unwrap_or_default();

        let updated = sqlx::query(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(&changes.name)
        .bind(&changes.description)
        .execute(&mut *tx)
        .await
        .map_err(|e| role_write_error(e, &name))?;

        if updated.rows_affected() == 0 {
            return Err(ScribeError::role_not_found(id));
        }

        if let Some(ref ids) = changes.permission_ids {
            Self::replace_role_permissions_tx(&mut tx, id.0, ids)
                .await
                .map_err(|e| role_write_error(e, &name))?;
        }

        tx.commit().await?;
        self.get_role(id).await
    }

    async fn delete_role(&self, id: RoleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ScribeError::role_not_found(id));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role-permission bindings
    // ─────────────────────────────────────────────────────────────────────────

    async fn set_role_permissions(&self, role_id: RoleId, ids: &[PermissionId]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM roles WHERE id = $1)")
            .bind(role_id.0)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(ScribeError::role_not_found(role_id));
        }

        Self::replace_role_permissions_tx(&mut tx, role_id.0, ids)
            .await
            .map_err(|e| role_write_error(e, ""))?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_role_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id.0)
        .bind(permission_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            binding_error(e, || {
                ScribeError::permission_not_found(permission_id)
                    .with_context("role_id", role_id.to_string())
            })
        })?;
        Ok(())
    }

    async fn remove_role_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(role_id.0)
                .bind(permission_id.0)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ScribeError::permission_not_found(permission_id));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User-role bindings
    // ─────────────────────────────────────────────────────────────────────────

    async fn assign_role(&self, binding: UserRoleBinding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, granted_by, granted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, role_id)
            DO UPDATE SET granted_by = EXCLUDED.granted_by, granted_at = EXCLUDED.granted_at
            "#,
        )
        .bind(binding.user_id.0)
        .bind(binding.role_id.0)
        .bind(binding.granted_by.map(|u| u.0))
        .bind(binding.granted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| binding_error(e, || ScribeError::role_not_found(binding.role_id)))?;
        Ok(())
    }

    async fn remove_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id.0)
            .bind(role_id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ScribeError::role_not_assigned(user_id, role_id));
        }
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
        granted_by: Option<UserId>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;

        let ids: Vec<Uuid> = role_ids.iter().map(|r| r.0).collect();
        if !ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_id, granted_by, granted_at)
                SELECT $1, unnest($2::uuid[]), $3, NOW()
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id.0)
            .bind(&ids)
            .bind(granted_by.map(|u| u.0))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                binding_error(e, || {
                    ScribeError::new(
                        crate::error::ErrorCode::RoleNotFound,
                        "One or more roles do not exist",
                    )
                })
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn user_authorization(&self, user_id: UserId) -> Result<UserAuthorization> {
        let role_rows: Vec<UserRoleRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.name, r.description, r.is_template, r.is_system,
                   r.created_at, r.updated_at, ur.granted_by, ur.granted_at
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        let role_ids: Vec<Uuid> = role_rows.iter().map(|r| r.role.id).collect();
        let mut permissions = self.permissions_for_roles(&role_ids).await?;

        let roles = role_rows
            .into_iter()
            .map(|row| {
                let perms = permissions.remove(&row.role.id).unwrap_or_default();
                RoleGrant {
                    role: row.role.into_role(perms),
                    granted_by: row.granted_by.map(UserId),
                    granted_at: row.granted_at,
                }
            })
            .collect();

        let direct_rows: Vec<UserPermissionRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.resource, p.action, p.scope, p.description,
                   p.created_at, p.updated_at, up.granted_by, up.granted_at
            FROM user_permissions up
            JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id = $1
            ORDER BY p.resource, p.action, p.scope NULLS FIRST
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        let permissions = direct_rows
            .into_iter()
            .map(|row| DirectGrant {
                permission: row.permission.into(),
                granted_by: row.granted_by.map(UserId),
                granted_at: row.granted_at,
            })
            .collect();

        Ok(UserAuthorization {
            user_id,
            roles,
            permissions,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Direct user permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn grant_permission(&self, binding: UserPermissionBinding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id, granted_by, granted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, permission_id)
            DO UPDATE SET granted_by = EXCLUDED.granted_by, granted_at = EXCLUDED.granted_at
            "#,
        )
        .bind(binding.user_id.0)
        .bind(binding.permission_id.0)
        .bind(binding.granted_by.map(|u| u.0))
        .bind(binding.granted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            binding_error(e, || ScribeError::permission_not_found(binding.permission_id))
        })?;
        Ok(())
    }

    async fn revoke_permission(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = $2")
                .bind(user_id.0)
                .bind(permission_id.0)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ScribeError::permission_not_granted(user_id, permission_id));
        }
        Ok(())
    }

    async fn clear_user_permissions(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hot path
    // ─────────────────────────────────────────────────────────────────────────

    async fn has_permission(&self, user_id: UserId, key: &PermissionKey) -> Result<bool> {
        let granted: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE ur.user_id = $1
                  AND p.resource = $2 AND p.action = $3
                  AND p.scope IS NOT DISTINCT FROM $4
                UNION ALL
                SELECT 1
                FROM user_permissions up
                JOIN permissions p ON p.id = up.permission_id
                WHERE up.user_id = $1
                  AND p.resource = $2 AND p.action = $3
                  AND p.scope IS NOT DISTINCT FROM $4
            )
            "#,
        )
        .bind(user_id.0)
        .bind(&key.resource)
        .bind(&key.action)
        .bind(&key.scope)
        .fetch_one(&self.pool)
        .await?;

        Ok(granted)
    }

    async fn has_any_permission(&self, user_id: UserId, keys: &[PermissionKey]) -> Result<bool> {
        if keys.is_empty() {
            return Ok(false);
        }
        let ids: Vec<String> = keys.iter().map(PermissionKey::canonical_id).collect();

        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE ur.user_id = $1 AND {canonical} = ANY($2)
                UNION ALL
                SELECT 1
                FROM user_permissions up
                JOIN permissions p ON p.id = up.permission_id
                WHERE up.user_id = $1 AND {canonical} = ANY($2)
            )
            "#,
            canonical = CANONICAL_ID_SQL
        );

        let granted: bool = sqlx::query_scalar(&sql)
            .bind(user_id.0)
            .bind(&ids)
            .fetch_one(&self.pool)
            .await?;

        Ok(granted)
    }

    async fn has_role(&self, user_id: UserId, role_name: &str) -> Result<bool> {
        let has: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id
                WHERE ur.user_id = $1 AND r.name = $2
            )
            "#,
        )
        .bind(user_id.0)
        .bind(role_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(has)
    }

    async fn user_permission_ids(&self, user_id: UserId) -> Result<Vec<String>> {
        let sql = format!(
            r#"
            SELECT {canonical} AS id
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1
            UNION
            SELECT {canonical} AS id
            FROM user_permissions up
            JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id = $1
            ORDER BY id
            "#,
            canonical = CANONICAL_ID_SQL
        );

        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn user_role_names(&self, user_id: UserId) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.name FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }
}
