//! Invariants of the registry, the store and the decision engine.

mod common;

use std::collections::BTreeSet;

use common::Fixture;
use scribe_core::error::ErrorCode;
use scribe_core::rbac::registry::registry;
use scribe_core::rbac::{
    seed, AuthzStore, InMemoryAuthzStore, NewRole, PermissionId, PermissionKey, RoleChanges,
    RoleId, UserId,
};
use uuid::Uuid;

async fn permission_id(fx: &Fixture, id: &str) -> PermissionId {
    fx.store
        .get_permission_by_key(&PermissionKey::parse(id))
        .await
        .unwrap()
        .id
}

#[test]
fn registry_identifiers_reassemble() {
    for entry in registry().all() {
        let key = PermissionKey::parse(&entry.id);
        assert_eq!(key.canonical_id(), entry.id);
        assert_eq!(key, entry.key);
    }
}

#[tokio::test]
async fn seeded_rows_are_all_registered() {
    let fx = Fixture::new().await;
    let rows = fx.store.list_permissions().await.unwrap();

    assert_eq!(rows.len(), registry().len());
    for row in rows {
        assert!(registry().is_valid(&row.canonical_id()), "{}", row.canonical_id());
    }
}

#[tokio::test]
async fn role_flags_are_enforced() {
    let fx = Fixture::new().await;

    for template in fx.roles.list_templates().await.unwrap() {
        let err = fx
            .roles
            .assign_role_to_user(fx.u, template.id, None)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::TemplateCannotAssign));

        let err = fx
            .roles
            .replace_user_roles(fx.u, &[template.id], None)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::TemplateCannotAssign));
    }

    let roles = fx.roles.get_all_roles().await.unwrap();
    for role in roles.iter().filter(|r| !r.is_template) {
        assert!(role.is_system, "{}", role.name);
        let err = fx
            .roles
            .update_role(role.id, Some("renamed"), None)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::CannotUpdateSystemRole));

        let err = fx
            .roles
            .update_role_permissions(role.id, &[])
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::CannotUpdateSystemRole));

        let err = fx.roles.delete_role(role.id).await.unwrap_err();
        assert!(err.is(ErrorCode::CannotDeleteSystemRole));
    }
}

#[tokio::test]
async fn seeded_templates_can_be_curated() {
    let fx = Fixture::new().await;
    let template = fx.role("content_manager_template").await;
    assert!(template.is_template && !template.is_system);

    let read = permission_id(&fx, "themes:read").await;
    let curated = fx
        .roles
        .update_role_permissions(template.id, &[read])
        .await
        .unwrap();
    assert_eq!(curated.permission_ids(), BTreeSet::from([read]));
    assert!(curated.is_template);

    // Reseeding leaves the operator's edits alone.
    seed(fx.store.as_ref()).await.unwrap();
    assert_eq!(
        fx.roles.get_role(template.id).await.unwrap().permission_ids(),
        BTreeSet::from([read])
    );

    fx.roles.delete_role(template.id).await.unwrap();
    let err = fx.roles.get_role(template.id).await.unwrap_err();
    assert!(err.is(ErrorCode::RoleNotFound));
}

#[tokio::test]
async fn clone_copies_template_permissions_by_value() {
    let fx = Fixture::new().await;
    let template = fx.role("moderator_template").await;

    let clone = fx
        .roles
        .create_role_from_template(template.id, "night_moderator", "")
        .await
        .unwrap();
    assert!(!clone.is_template && !clone.is_system);
    assert_eq!(clone.permission_ids(), template.permission_ids());

    // Editing the clone leaves the template alone.
    fx.roles.update_role_permissions(clone.id, &[]).await.unwrap();
    assert_eq!(
        fx.roles.get_role(template.id).await.unwrap().permission_ids(),
        template.permission_ids()
    );

    let err = fx
        .roles
        .create_role_from_template(clone.id, "again", "")
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::NotATemplate));
}

#[tokio::test]
async fn grants_and_revocations_flip_decisions() {
    let fx = Fixture::new().await;
    let themes_create = permission_id(&fx, "themes:create").await;

    assert!(!fx.engine.has_permission(fx.u, "themes:create").await.unwrap());

    fx.roles
        .grant_permission_to_user(fx.u, themes_create, Some(fx.v))
        .await
        .unwrap();
    assert!(fx.engine.has_permission(fx.u, "themes:create").await.unwrap());

    fx.roles
        .revoke_permission_from_user(fx.u, themes_create)
        .await
        .unwrap();
    assert!(!fx.engine.has_permission(fx.u, "themes:create").await.unwrap());

    let editor = fx.role("editor").await;
    fx.roles
        .assign_role_to_user(fx.u, editor.id, None)
        .await
        .unwrap();
    assert!(fx.engine.has_permission(fx.u, "themes:create").await.unwrap());

    fx.roles.remove_role_from_user(fx.u, editor.id).await.unwrap();
    assert!(!fx.engine.has_permission(fx.u, "themes:create").await.unwrap());

    let err = fx
        .roles
        .remove_role_from_user(fx.u, editor.id)
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::RoleNotAssigned));
}

const OWN_ACTIONS: &[&str] = &["update", "delete", "publish", "read:draft"];

#[tokio::test]
async fn any_scope_wins_over_ownership() {
    let fx = Fixture::new().await;

    for action in OWN_ACTIONS {
        let any = permission_id(&fx, &format!("posts:{}:any", action)).await;
        fx.roles.grant_permission_to_user(fx.u, any, None).await.unwrap();
    }

    for action in OWN_ACTIONS {
        // Not the owner, not holding :own, unknown resource: still granted.
        assert!(fx.engine.can(fx.u, "posts", action, Some(fx.p2)).await.unwrap());
        assert!(fx
            .engine
            .can(fx.u, "posts", action, Some(Uuid::new_v4()))
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn own_scope_needs_ownership_and_the_permission() {
    let fx = Fixture::new().await;

    // Owner without the permission.
    for action in OWN_ACTIONS {
        assert!(!fx.engine.can(fx.u, "posts", action, Some(fx.p1)).await.unwrap());
    }

    for action in OWN_ACTIONS {
        let own = permission_id(&fx, &format!("posts:{}:own", action)).await;
        fx.roles.grant_permission_to_user(fx.u, own, None).await.unwrap();
    }

    for action in OWN_ACTIONS {
        assert!(fx.engine.can(fx.u, "posts", action, Some(fx.p1)).await.unwrap());
        assert!(!fx.engine.can(fx.u, "posts", action, Some(fx.p2)).await.unwrap());
        assert!(!fx
            .engine
            .can(fx.u, "posts", action, Some(Uuid::new_v4()))
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn hot_path_agrees_with_object_reads() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "author").await;
    let theme_delete = permission_id(&fx, "themes:delete:any").await;
    fx.roles
        .grant_permission_to_user(fx.u, theme_delete, None)
        .await
        .unwrap();

    for user in [fx.u, fx.v] {
        let effective = fx
            .roles
            .get_user_authorization(user)
            .await
            .unwrap()
            .effective_permission_ids();

        for entry in registry().all() {
            let held = fx.store.has_permission(user, &entry.key).await.unwrap();
            assert_eq!(held, effective.contains(&entry.id), "{} for {}", entry.id, user);
        }

        let listed: BTreeSet<String> = fx
            .engine
            .user_permissions(user)
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(listed, effective);
    }
}

#[tokio::test]
async fn multi_row_writes_are_all_or_nothing() {
    let fx = Fixture::new().await;
    let read = permission_id(&fx, "themes:read").await;
    let missing = PermissionId::new();

    // Role creation: the second permission does not exist.
    let err = fx
        .store
        .create_role(NewRole::new("half_made", "").with_permissions([read, missing]))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::PermissionNotFound));
    let err = fx.store.get_role_by_name("half_made").await.unwrap_err();
    assert!(err.is(ErrorCode::RoleNotFound));

    // Permission replacement together with a rename.
    let role = fx
        .roles
        .create_role_with_permissions("reviewer", "", false, &[read])
        .await
        .unwrap();
    let err = fx
        .store
        .update_role(
            role.id,
            RoleChanges {
                name: Some("renamed".to_string()),
                description: None,
                permission_ids: Some(vec![missing]),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::PermissionNotFound));
    let unchanged = fx.roles.get_role(role.id).await.unwrap();
    assert_eq!(unchanged.name, "reviewer");
    assert_eq!(unchanged.permission_ids(), BTreeSet::from([read]));

    // User-role replacement: the second role does not exist.
    fx.roles
        .assign_role_to_user(fx.u, role.id, Some(fx.v))
        .await
        .unwrap();
    let author = fx.role("author").await;
    let err = fx
        .store
        .replace_user_roles(fx.u, &[author.id, RoleId::new()], None)
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::RoleNotFound));
    assert_eq!(
        fx.engine.user_roles(fx.u).await.unwrap(),
        vec!["reviewer".to_string()]
    );
}

#[tokio::test]
async fn seeding_twice_matches_seeding_once() {
    let store = InMemoryAuthzStore::new();
    seed(&store).await.unwrap();

    let snapshot = |store: InMemoryAuthzStore| async move {
        let permissions: Vec<(PermissionId, String)> = store
            .list_permissions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.canonical_id()))
            .collect();
        let roles: Vec<(RoleId, String, BTreeSet<PermissionId>)> = store
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.name.clone(), r.permission_ids()))
            .collect();
        (permissions, roles)
    };

    let first = snapshot(store.clone()).await;
    let report = seed(&store).await.unwrap();
    let second = snapshot(store.clone()).await;

    assert_eq!(first, second);
    assert_eq!(report.roles_created, 0);
    assert_eq!(report.roles_updated, 0);
    assert_eq!(report.permissions_removed, 0);
}

#[tokio::test]
async fn reassigning_a_role_refreshes_the_audit_fields() {
    let fx = Fixture::new().await;
    let author = fx.role("author").await;
    let admin_user = UserId::new();

    fx.roles
        .assign_role_to_user(fx.u, author.id, Some(fx.v))
        .await
        .unwrap();
    let first = fx.roles.get_user_roles_with_details(fx.u).await.unwrap();

    fx.roles
        .assign_role_to_user(fx.u, author.id, Some(admin_user))
        .await
        .unwrap();
    let second = fx.roles.get_user_roles_with_details(fx.u).await.unwrap();

    assert_eq!(second.len(), 1);
    assert_eq!(first[0].granted_by, Some(fx.v));
    assert_eq!(second[0].granted_by, Some(admin_user));
    assert!(second[0].granted_at >= first[0].granted_at);
}
