//! End-to-end decisions against the seeded catalog.
//!
//! `u` authored `p1` and `v` authored `p2` in every test.

mod common;

use common::Fixture;
use scribe_core::error::ErrorCode;
use uuid::Uuid;

#[tokio::test]
async fn author_updates_own_post() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "author").await;

    assert!(fx.engine.can(fx.u, "posts", "update", Some(fx.p1)).await.unwrap());
}

#[tokio::test]
async fn author_cannot_update_someone_elses_post() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "author").await;

    assert!(!fx.engine.can(fx.u, "posts", "update", Some(fx.p2)).await.unwrap());
}

#[tokio::test]
async fn editor_updates_any_post() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "editor").await;

    assert!(fx.engine.can(fx.u, "posts", "update", Some(fx.p2)).await.unwrap());
}

#[tokio::test]
async fn contributor_cannot_publish() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "contributor").await;

    assert!(!fx.engine.can(fx.u, "posts", "publish", Some(fx.p1)).await.unwrap());
    // Still allowed to edit the draft.
    assert!(fx.engine.can(fx.u, "posts", "update", Some(fx.p1)).await.unwrap());
}

#[tokio::test]
async fn template_role_is_not_assignable() {
    let fx = Fixture::new().await;
    let template = fx.role("content_manager_template").await;

    let err = fx
        .roles
        .assign_role_to_user(fx.u, template.id, Some(fx.v))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::TemplateCannotAssign));

    let snapshot = fx.roles.get_user_authorization(fx.u).await.unwrap();
    assert!(snapshot.roles.is_empty());
}

#[tokio::test]
async fn system_role_is_not_deletable() {
    let fx = Fixture::new().await;
    let admin = fx.role("admin").await;

    let err = fx.roles.delete_role(admin.id).await.unwrap_err();
    assert!(err.is(ErrorCode::CannotDeleteSystemRole));
    assert_eq!(err.code().business_code(), Some("CANNOT_DELETE_SYSTEM_ROLE"));
    assert!(fx.roles.get_role(admin.id).await.is_ok());
}

#[tokio::test]
async fn cloned_template_is_assignable_and_inherits_permissions() {
    let fx = Fixture::new().await;
    let template = fx.role("content_manager_template").await;

    let site_editor = fx
        .roles
        .create_role_from_template(template.id, "site_editor", "Edits the marketing site")
        .await
        .unwrap();
    assert!(!site_editor.is_template);
    assert!(!site_editor.is_system);

    fx.roles
        .assign_role_to_user(fx.u, site_editor.id, Some(fx.v))
        .await
        .unwrap();

    let draft = Uuid::new_v4();
    fx.posts.set_owner(draft, fx.u);
    assert!(fx.engine.can(fx.u, "posts", "publish", Some(draft)).await.unwrap());
    assert!(!fx.engine.can(fx.u, "posts", "publish", Some(fx.p2)).await.unwrap());
}

#[tokio::test]
async fn unknown_permission_is_an_error_not_a_denial() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "admin").await;

    let err = fx
        .engine
        .can(fx.u, "widgets", "frobnicate", None)
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::InvalidPermission));

    let err = fx
        .engine
        .can(fx.u, "widgets", "frobnicate", Some(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(err.is(ErrorCode::InvalidPermission));
}

#[tokio::test]
async fn subscriber_reads_only_published_content() {
    let fx = Fixture::new().await;
    fx.grant_role(fx.u, "subscriber").await;

    assert!(fx.engine.can(fx.u, "posts", "read:published", None).await.unwrap());
    assert!(!fx.engine.can(fx.u, "posts", "create", None).await.unwrap());
    assert!(fx.engine.has_role(fx.u, "subscriber").await.unwrap());
    assert!(!fx.engine.has_role(fx.u, "author").await.unwrap());
}
