//! In-process [`AuthzStore`] used by tests and local development.
//!
//! Mutations run against a copy of the state that is swapped in only when the
//! whole operation succeeds, so multi-row writes are all-or-nothing exactly as
//! with the Postgres transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::AuthzStore;
use crate::error::{Result, ScribeError};
use crate::rbac::models::{
    DirectGrant, NewPermission, NewRole, Permission, PermissionId, Role, RoleChanges, RoleGrant,
    RoleId, UserAuthorization, UserId, UserPermissionBinding, UserRoleBinding,
};
use crate::rbac::registry::PermissionKey;

#[derive(Debug, Clone)]
struct RoleRecord {
    id: RoleId,
    name: String,
    description: String,
    is_template: bool,
    is_system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Audit {
    granted_by: Option<UserId>,
    granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct State {
    permissions: HashMap<PermissionId, Permission>,
    roles: HashMap<RoleId, RoleRecord>,
    role_permissions: HashMap<RoleId, BTreeSet<PermissionId>>,
    user_roles: HashMap<(UserId, RoleId), Audit>,
    user_permissions: HashMap<(UserId, PermissionId), Audit>,
}

impl State {
    fn permission(&self, id: PermissionId) -> Result<&Permission> {
        self.permissions
            .get(&id)
            .ok_or_else(|| ScribeError::permission_not_found(id))
    }

    fn role_record(&self, id: RoleId) -> Result<&RoleRecord> {
        self.roles.get(&id).ok_or_else(|| ScribeError::role_not_found(id))
    }

    fn ensure_name_free(&self, name: &str, except: Option<RoleId>) -> Result<()> {
        let taken = self
            .roles
            .values()
            .any(|r| r.name == name && Some(r.id) != except);
        if taken {
            return Err(ScribeError::role_name_exists(name));
        }
        Ok(())
    }

    fn load_role(&self, record: &RoleRecord) -> Role {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .get(&record.id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.permissions.get(id).cloned())
            .collect();
        sort_permissions(&mut permissions);

        Role {
            id: record.id,
            name: record.name.clone(),
            description: record.description.clone(),
            is_template: record.is_template,
            is_system: record.is_system,
            permissions,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn set_role_permissions(&mut self, role_id: RoleId, ids: &[PermissionId]) -> Result<()> {
        self.role_record(role_id)?;
        let mut set = BTreeSet::new();
        for id in ids {
            self.permission(*id)?;
            set.insert(*id);
        }
        self.role_permissions.insert(role_id, set);
        Ok(())
    }

    /// Permission ids reachable by `user_id` through roles and direct grants.
    fn effective(&self, user_id: UserId) -> BTreeSet<PermissionId> {
        let via_roles = self
            .user_roles
            .keys()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, role_id)| self.role_permissions.get(role_id))
            .flatten()
            .copied();
        let direct = self
            .user_permissions
            .keys()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, permission_id)| *permission_id);
        via_roles.chain(direct).collect()
    }
}

fn sort_permissions(permissions: &mut [Permission]) {
    permissions.sort_by(|a, b| {
        (&a.resource, &a.action, &a.scope).cmp(&(&b.resource, &b.action, &b.scope))
    });
}

/// Thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryAuthzStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryAuthzStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> Result<T>) -> Result<T> {
        f(&self.state.read())
    }

    /// Apply `f` to a copy of the state; publish the copy only on success.
    fn write<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }
}

#[async_trait]
impl AuthzStore for InMemoryAuthzStore {
    async fn get_permission(&self, id: PermissionId) -> Result<Permission> {
        self.read(|s| s.permission(id).cloned())
    }

    async fn get_permission_by_key(&self, key: &PermissionKey) -> Result<Permission> {
        self.read(|s| {
            s.permissions
                .values()
                .find(|p| p.matches(key))
                .cloned()
                .ok_or_else(|| ScribeError::permission_not_found(key))
        })
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.read(|s| {
            let mut all: Vec<Permission> = s.permissions.values().cloned().collect();
            sort_permissions(&mut all);
            Ok(all)
        })
    }

    async fn create_permission(&self, new: NewPermission) -> Result<Permission> {
        self.write(|s| {
            if let Some(existing) = s.permissions.values_mut().find(|p| p.matches(&new.key)) {
                existing.description = new.description;
                existing.updated_at = Utc::now();
                return Ok(existing.clone());
            }
            let permission = Permission::new(new.key, new.description);
            s.permissions.insert(permission.id, permission.clone());
            Ok(permission)
        })
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        description: String,
    ) -> Result<Permission> {
        self.write(|s| {
            let permission = s
                .permissions
                .get_mut(&id)
                .ok_or_else(|| ScribeError::permission_not_found(id))?;
            permission.description = description;
            permission.updated_at = Utc::now();
            Ok(permission.clone())
        })
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        self.write(|s| {
            s.permissions
                .remove(&id)
                .ok_or_else(|| ScribeError::permission_not_found(id))?;
            for set in s.role_permissions.values_mut() {
                set.remove(&id);
            }
            s.user_permissions.retain(|(_, p), _| *p != id);
            Ok(())
        })
    }

    async fn get_role(&self, id: RoleId) -> Result<Role> {
        self.read(|s| s.role_record(id).map(|r| s.load_role(r)))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Role> {
        self.read(|s| {
            s.roles
                .values()
                .find(|r| r.name == name)
                .map(|r| s.load_role(r))
                .ok_or_else(|| ScribeError::role_not_found(name))
        })
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.read(|s| {
            let mut roles: Vec<Role> = s.roles.values().map(|r| s.load_role(r)).collect();
            roles.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(roles)
        })
    }

    async fn list_templates(&self) -> Result<Vec<Role>> {
        let roles = self.list_roles().await?;
        Ok(roles.into_iter().filter(|r| r.is_template).collect())
    }

    async fn create_role(&self, new: NewRole) -> Result<Role> {
        self.write(|s| {
            s.ensure_name_free(&new.name, None)?;
            let now = Utc::now();
            let record = RoleRecord {
                id: RoleId::new(),
                name: new.name,
                description: new.description,
                is_template: new.is_template,
                is_system: new.is_system,
                created_at: now,
                updated_at: now,
            };
            let id = record.id;
            s.roles.insert(id, record);
            s.set_role_permissions(id, &new.permission_ids)?;
            let record = s.role_record(id)?;
            Ok(s.load_role(record))
        })
    }

    async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role> {
        self.write(|s| {
            s.role_record(id)?;
            if let Some(ref name) = changes.name {
                s.ensure_name_free(name, Some(id))?;
            }
            if let Some(ref ids) = changes.permission_ids {
                s.set_role_permissions(id, ids)?;
            }
            let record = s
                .roles
                .get_mut(&id)
                .ok_or_else(|| ScribeError::role_not_found(id))?;
            if let Some(name) = changes.name {
                record.name = name;
            }
            if let Some(description) = changes.description {
                record.description = description;
            }
            record.updated_at = Utc::now();
            let record = record.clone();
            Ok(s.load_role(&record))
        })
    }

    async fn delete_role(&self, id: RoleId) -> Result<()> {
        self.write(|s| {
            s.roles
                .remove(&id)
                .ok_or_else(|| ScribeError::role_not_found(id))?;
            s.role_permissions.remove(&id);
            s.user_roles.retain(|(_, r), _| *r != id);
            Ok(())
        })
    }

    async fn set_role_permissions(&self, role_id: RoleId, ids: &[PermissionId]) -> Result<()> {
        self.write(|s| s.set_role_permissions(role_id, ids))
    }

    async fn add_role_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<()> {
        self.write(|s| {
            s.role_record(role_id)?;
            s.permission(permission_id)?;
            s.role_permissions
                .entry(role_id)
                .or_default()
                .insert(permission_id);
            Ok(())
        })
    }

    async fn remove_role_permission(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<()> {
        self.write(|s| {
            s.role_record(role_id)?;
            let removed = s
                .role_permissions
                .get_mut(&role_id)
                .map(|set| set.remove(&permission_id))
                .unwrap_or(false);
            if !removed {
                return Err(ScribeError::permission_not_found(permission_id));
            }
            Ok(())
        })
    }

    async fn assign_role(&self, binding: UserRoleBinding) -> Result<()> {
        self.write(|s| {
            s.role_record(binding.role_id)?;
            s.user_roles.insert(
                (binding.user_id, binding.role_id),
                Audit {
                    granted_by: binding.granted_by,
                    granted_at: binding.granted_at,
                },
            );
            Ok(())
        })
    }

    async fn remove_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        self.write(|s| {
            s.user_roles
                .remove(&(user_id, role_id))
                .map(|_| ())
                .ok_or_else(|| ScribeError::role_not_assigned(user_id, role_id))
        })
    }

    async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
        granted_by: Option<UserId>,
    ) -> Result<()> {
        self.write(|s| {
            s.user_roles.retain(|(u, _), _| *u != user_id);
            let granted_at = Utc::now();
            for role_id in role_ids {
                s.role_record(*role_id)?;
                s.user_roles.insert(
                    (user_id, *role_id),
                    Audit {
                        granted_by,
                        granted_at,
                    },
                );
            }
            Ok(())
        })
    }

    async fn user_authorization(&self, user_id: UserId) -> Result<UserAuthorization> {
        self.read(|s| {
            let mut roles: Vec<RoleGrant> = s
                .user_roles
                .iter()
                .filter(|((u, _), _)| *u == user_id)
                .filter_map(|((_, role_id), audit)| {
                    s.roles.get(role_id).map(|record| RoleGrant {
                        role: s.load_role(record),
                        granted_by: audit.granted_by,
                        granted_at: audit.granted_at,
                    })
                })
                .collect();
            roles.sort_by(|a, b| a.role.name.cmp(&b.role.name));

            let mut permissions: Vec<DirectGrant> = s
                .user_permissions
                .iter()
                .filter(|((u, _), _)| *u == user_id)
                .filter_map(|((_, permission_id), audit)| {
                    s.permissions.get(permission_id).map(|p| DirectGrant {
                        permission: p.clone(),
                        granted_by: audit.granted_by,
                        granted_at: audit.granted_at,
                    })
                })
                .collect();
            permissions.sort_by_key(|g| g.permission.canonical_id());

            Ok(UserAuthorization {
                user_id,
                roles,
                permissions,
            })
        })
    }

    async fn grant_permission(&self, binding: UserPermissionBinding) -> Result<()> {
        self.write(|s| {
            s.permission(binding.permission_id)?;
            s.user_permissions.insert(
                (binding.user_id, binding.permission_id),
                Audit {
                    granted_by: binding.granted_by,
                    granted_at: binding.granted_at,
                },
            );
            Ok(())
        })
    }

    async fn revoke_permission(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> Result<()> {
        self.write(|s| {
            s.user_permissions
                .remove(&(user_id, permission_id))
                .map(|_| ())
                .ok_or_else(|| ScribeError::permission_not_granted(user_id, permission_id))
        })
    }

    async fn clear_user_permissions(&self, user_id: UserId) -> Result<u64> {
        self.write(|s| {
            let before = s.user_permissions.len();
            s.user_permissions.retain(|(u, _), _| *u != user_id);
            Ok((before - s.user_permissions.len()) as u64)
        })
    }

    async fn has_permission(&self, user_id: UserId, key: &PermissionKey) -> Result<bool> {
        self.read(|s| {
            Ok(s.effective(user_id)
                .iter()
                .filter_map(|id| s.permissions.get(id))
                .any(|p| p.matches(key)))
        })
    }

    async fn has_any_permission(&self, user_id: UserId, keys: &[PermissionKey]) -> Result<bool> {
        self.read(|s| {
            Ok(s.effective(user_id)
                .iter()
                .filter_map(|id| s.permissions.get(id))
                .any(|p| keys.iter().any(|k| p.matches(k))))
        })
    }

    async fn has_role(&self, user_id: UserId, role_name: &str) -> Result<bool> {
        self.read(|s| {
            Ok(s.user_roles.keys().any(|(u, role_id)| {
                *u == user_id
                    && s.roles
                        .get(role_id)
                        .map(|r| r.name == role_name)
                        .unwrap_or(false)
            }))
        })
    }

    async fn user_permission_ids(&self, user_id: UserId) -> Result<Vec<String>> {
        self.read(|s| {
            let ids: BTreeSet<String> = s
                .effective(user_id)
                .iter()
                .filter_map(|id| s.permissions.get(id))
                .map(Permission::canonical_id)
                .collect();
            Ok(ids.into_iter().collect())
        })
    }

    async fn user_role_names(&self, user_id: UserId) -> Result<Vec<String>> {
        self.read(|s| {
            let names: BTreeSet<String> = s
                .user_roles
                .keys()
                .filter(|(u, _)| *u == user_id)
                .filter_map(|(_, role_id)| s.roles.get(role_id).map(|r| r.name.clone()))
                .collect();
            Ok(names.into_iter().collect())
        })
    }
}
