//! Reconciles the persisted catalog with the compiled-in registry.
//!
//! Running the seeder any number of times leaves the same rows as running it
//! once: every registry permission exists, rows the registry no longer knows
//! are removed, and each predefined role exists. System roles are reset to
//! their default permissions; templates keep whatever operators made of them.

use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use super::models::{NewPermission, NewRole, PermissionId};
use super::registry::registry;
use super::roles::PredefinedRole;
use super::store::AuthzStore;
use crate::error::{ErrorCode, Result};

/// What a seeding pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions: usize,
    pub permissions_removed: usize,
    pub roles_created: usize,
    pub roles_updated: usize,
}

pub async fn seed(store: &dyn AuthzStore) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut ids: HashMap<String, PermissionId> = HashMap::new();

    for entry in registry().all() {
        let permission = store
            .create_permission(NewPermission {
                key: entry.key.clone(),
                description: entry.description.clone(),
            })
            .await
            .map_err(|e| e.wrap(format!("seeding permission {}", entry.id)))?;
        ids.insert(entry.id.clone(), permission.id);
    }
    report.permissions = ids.len();

    for row in store.list_permissions().await? {
        let id = row.canonical_id();
        if !registry().is_valid(&id) {
            warn!(permission = %id, "Removing permission no longer in the registry");
            store.delete_permission(row.id).await?;
            report.permissions_removed += 1;
        }
    }

    for role in PredefinedRole::all() {
        let wanted: BTreeSet<PermissionId> = role
            .permissions()
            .iter()
            .filter_map(|p| ids.get(*p).copied())
            .collect();

        match store.get_role_by_name(role.name()).await {
            Ok(existing) => {
                if existing.is_system != role.is_system()
                    || existing.is_template != role.is_template()
                {
                    warn!(
                        role = %role.name(),
                        "A custom role uses a predefined name; leaving it untouched"
                    );
                    continue;
                }
                if role.is_system() && existing.permission_ids() != wanted {
                    let wanted: Vec<PermissionId> = wanted.into_iter().collect();
                    store.set_role_permissions(existing.id, &wanted).await?;
                    report.roles_updated += 1;
                }
            }
            Err(e) if e.is(ErrorCode::RoleNotFound) => {
                let mut new = NewRole::new(role.name(), role.description())
                    .with_permissions(wanted);
                new.is_template = role.is_template();
                new.is_system = role.is_system();
                store.create_role(new).await?;
                report.roles_created += 1;
            }
            Err(e) => return Err(e.wrap(format!("seeding role {}", role.name()))),
        }
    }

    info!(
        permissions = report.permissions,
        permissions_removed = report.permissions_removed,
        roles_created = report.roles_created,
        roles_updated = report.roles_updated,
        "Authorization catalog seeded"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::registry::PermissionKey;
    use crate::rbac::store::InMemoryAuthzStore;

    #[tokio::test]
    async fn test_seed_creates_catalog_and_roles() {
        let store = InMemoryAuthzStore::new();
        let report = seed(&store).await.unwrap();

        assert_eq!(report.permissions, registry().len());
        assert_eq!(report.roles_created, PredefinedRole::all().len());

        let templates = store.list_templates().await.unwrap();
        let names: Vec<_> = templates.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["content_manager_template", "moderator_template"]);

        let admin = store.get_role_by_name("admin").await.unwrap();
        assert!(admin.is_system);
        assert_eq!(admin.permissions.len(), registry().len());
    }

    #[tokio::test]
    async fn test_seed_keeps_curated_templates() {
        let store = InMemoryAuthzStore::new();
        seed(&store).await.unwrap();

        let template = store.get_role_by_name("moderator_template").await.unwrap();
        assert!(template.is_template && !template.is_system);
        store.set_role_permissions(template.id, &[]).await.unwrap();

        let editor = store.get_role_by_name("editor").await.unwrap();
        store.set_role_permissions(editor.id, &[]).await.unwrap();

        let report = seed(&store).await.unwrap();
        assert_eq!(report.roles_updated, 1);
        assert!(store
            .get_role(template.id)
            .await
            .unwrap()
            .permissions
            .is_empty());
        assert!(!store.get_role(editor.id).await.unwrap().permissions.is_empty());
    }

    #[tokio::test]
    async fn test_seed_removes_unregistered_rows() {
        let store = InMemoryAuthzStore::new();
        store
            .create_permission(NewPermission {
                key: PermissionKey::parse("widgets:frobnicate"),
                description: String::new(),
            })
            .await
            .unwrap();

        let report = seed(&store).await.unwrap();

        assert_eq!(report.permissions_removed, 1);
        for row in store.list_permissions().await.unwrap() {
            assert!(registry().is_valid(&row.canonical_id()));
        }
    }
}
