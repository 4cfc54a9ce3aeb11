//! Decision engine.
//!
//! Answers "can user U perform action A on resource R, optionally on the
//! specific instance I?" by combining registry validation, store existence
//! queries and the ownership registry.
//!
//! For ownership-scoped permissions (`:own` / `:self`) the global `:any`
//! counterpart is checked first; only when it is missing is the ownership
//! registry consulted, and then the scoped permission itself must also be held.
//!
//! Errors are never converted into denials. A check that failed returns `Err`,
//! a check that denied returns `Ok(false)`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use super::models::UserId;
use super::ownership::OwnershipRegistry;
use super::registry::{self, PermissionKey, PermissionRegistry};
use super::store::AuthzStore;
use crate::error::{ErrorCode, Result, ScribeError};
use crate::observability::metrics::{record_decision, DecisionOutcome};

pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(2);

/// Stateless decision service; cheap to clone.
#[derive(Clone)]
pub struct PolicyEngine {
    store: Arc<dyn AuthzStore>,
    ownership: OwnershipRegistry,
    registry: &'static PermissionRegistry,
    timeout: Duration,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn AuthzStore>, ownership: OwnershipRegistry) -> Self {
        Self {
            store,
            ownership,
            registry: registry::registry(),
            timeout: DEFAULT_DECISION_TIMEOUT,
        }
    }

    /// Bound every store and ownership call; expiry yields `Canceled`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ownership(&self) -> &OwnershipRegistry {
        &self.ownership
    }

    pub fn store(&self) -> &Arc<dyn AuthzStore> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────────

    /// `Can(user, resource, action, resource_id?)`.
    ///
    /// Without a resource id this is the global check of `resource:action`.
    /// With one, the request is rewritten to `resource:action:own` and the
    /// ownership rule applies, using `resource` as the ownership type.
    pub async fn can(
        &self,
        user_id: UserId,
        resource: &str,
        action: &str,
        resource_id: Option<Uuid>,
    ) -> Result<bool> {
        let id = format!("{}:{}", resource, action);

        let result = match resource_id {
            None => self.global(user_id, &id).await,
            Some(resource_id) => {
                let own = format!("{}:own", id);
                match self.registry.require(&own) {
                    Ok(entry) => {
                        self.ownership_rule(user_id, &entry.key, resource, resource_id)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
        };

        observe("can", user_id, &id, result)
    }

    /// Global permission check. Ownership-scoped identifiers need a resource
    /// id and are rejected here with `InvalidPermission`.
    pub async fn has_permission(&self, user_id: UserId, permission: &str) -> Result<bool> {
        let result = self.global(user_id, permission).await;
        observe("has_permission", user_id, permission, result)
    }

    /// True at the first granted permission. One store round-trip.
    pub async fn has_any_permission(&self, user_id: UserId, permissions: &[&str]) -> Result<bool> {
        let label = permissions.join(",");
        let result: Result<bool> = async {
            let keys = self.global_keys(permissions)?;
            self.bounded(self.store.has_any_permission(user_id, &keys))
                .await
                .map_err(|e| e.wrap("checking any permission"))
        }
        .await;
        observe("has_any_permission", user_id, &label, result)
    }

    /// False at the first missing permission.
    pub async fn has_all_permissions(
        &self,
        user_id: UserId,
        permissions: &[&str],
    ) -> Result<bool> {
        let label = permissions.join(",");
        let result: Result<bool> = async {
            let keys = self.global_keys(permissions)?;
            for key in &keys {
                let held = self
                    .bounded(self.store.has_permission(user_id, key))
                    .await
                    .map_err(|e| e.wrap("checking all permissions"))?;
                if !held {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        .await;
        observe("has_all_permissions", user_id, &label, result)
    }

    /// Resource-scoped check used by route guards.
    ///
    /// Ownership-scoped permissions go through the ownership rule against
    /// `resource_type`; any other permission degenerates to the global check.
    pub async fn check_resource_permission(
        &self,
        user_id: UserId,
        permission: &str,
        resource_type: &str,
        resource_id: Uuid,
    ) -> Result<bool> {
        let result = match self.registry.require(permission) {
            Ok(entry) if entry.key.is_ownership_based() => {
                self.ownership_rule(user_id, &entry.key, resource_type, resource_id)
                    .await
            }
            Ok(entry) => self.held(user_id, &entry.key).await,
            Err(e) => Err(e),
        };
        observe("resource_permission", user_id, permission, result)
    }

    pub async fn has_role(&self, user_id: UserId, role_name: &str) -> Result<bool> {
        let result = self
            .bounded(self.store.has_role(user_id, role_name))
            .await
            .map_err(|e| e.wrap("checking role"));
        observe("has_role", user_id, role_name, result)
    }

    /// Effective permission identifiers. For UI hints, never for decisions.
    pub async fn user_permissions(&self, user_id: UserId) -> Result<Vec<String>> {
        self.bounded(self.store.user_permission_ids(user_id)).await
    }

    /// Bound role names. For UI hints, never for decisions.
    pub async fn user_roles(&self, user_id: UserId) -> Result<Vec<String>> {
        self.bounded(self.store.user_role_names(user_id)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn global(&self, user_id: UserId, permission: &str) -> Result<bool> {
        let key = self.global_key(permission)?;
        self.held(user_id, &key).await
    }

    fn global_key(&self, permission: &str) -> Result<PermissionKey> {
        let entry = self.registry.require(permission)?;
        if entry.key.is_ownership_based() {
            return Err(ScribeError::invalid_permission(permission)
                .with_context("reason", "permission requires a resource id"));
        }
        Ok(entry.key.clone())
    }

    fn global_keys(&self, permissions: &[&str]) -> Result<Vec<PermissionKey>> {
        permissions.iter().map(|p| self.global_key(p)).collect()
    }

    async fn held(&self, user_id: UserId, key: &PermissionKey) -> Result<bool> {
        self.bounded(self.store.has_permission(user_id, key))
            .await
            .map_err(|e| e.wrap(format!("checking {}", key)))
    }

    /// `:any` first, then ownership, then the scoped permission itself.
    async fn ownership_rule(
        &self,
        user_id: UserId,
        key: &PermissionKey,
        resource_type: &str,
        resource_id: Uuid,
    ) -> Result<bool> {
        if let Some(any) = key.any_counterpart() {
            if self.held(user_id, &any).await? {
                debug!(user_id = %user_id, permission = %any, "Granted by global permission");
                return Ok(true);
            }
        }

        let owner = self
            .bounded(self.ownership.check(user_id, resource_type, resource_id))
            .await?;
        if !owner {
            debug!(
                user_id = %user_id,
                resource_type = %resource_type,
                resource_id = %resource_id,
                "Not the owner"
            );
            return Ok(false);
        }

        self.held(user_id, key).await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut).await?
    }
}

/// Log and count the outcome of a decision.
fn observe(check: &'static str, user_id: UserId, permission: &str, result: Result<bool>) -> Result<bool> {
    match &result {
        Ok(true) => record_decision(check, DecisionOutcome::Granted),
        Ok(false) => {
            debug!(user_id = %user_id, permission = %permission, check, "Permission denied");
            record_decision(check, DecisionOutcome::Denied);
        }
        Err(e) => {
            if e.code().is_server_fault() || e.is(ErrorCode::Canceled) {
                error!(
                    user_id = %user_id,
                    permission = %permission,
                    check,
                    error = %e.chain(),
                    "Authorization check failed"
                );
            }
            record_decision(check, DecisionOutcome::Error);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{NewPermission, NewRole, UserRoleBinding};
    use crate::rbac::ownership::{OwnershipChecker, StaticOwnershipChecker};
    use crate::rbac::store::InMemoryAuthzStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct SlowChecker;

    #[async_trait]
    impl OwnershipChecker for SlowChecker {
        async fn is_owner(&self, _user_id: UserId, _resource_id: Uuid) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    struct BrokenChecker;

    #[async_trait]
    impl OwnershipChecker for BrokenChecker {
        async fn is_owner(&self, _user_id: UserId, _resource_id: Uuid) -> Result<bool> {
            Err(ScribeError::internal("connection reset"))
        }
    }

    async fn engine_with_role(user: UserId, permissions: &[&str]) -> PolicyEngine {
        let store = InMemoryAuthzStore::new();
        let mut ids = Vec::new();
        for id in permissions {
            let p = store
                .create_permission(NewPermission {
                    key: PermissionKey::parse(id),
                    description: String::new(),
                })
                .await
                .unwrap();
            ids.push(p.id);
        }
        let role = store
            .create_role(NewRole::new("tester", "").with_permissions(ids))
            .await
            .unwrap();
        store
            .assign_role(UserRoleBinding {
                user_id: user,
                role_id: role.id,
                granted_by: None,
                granted_at: Utc::now(),
            })
            .await
            .unwrap();
        PolicyEngine::new(Arc::new(store), OwnershipRegistry::new())
    }

    #[tokio::test]
    async fn test_global_check() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:create"]).await;

        assert!(engine.has_permission(user, "posts:create").await.unwrap());
        assert!(!engine.has_permission(user, "themes:create").await.unwrap());
        assert!(engine.can(user, "posts", "create", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_permission_is_error_not_denial() {
        let user = UserId::new();
        let engine = engine_with_role(user, &[]).await;

        let err = engine.has_permission(user, "widgets:frobnicate").await.unwrap_err();
        assert!(err.is(ErrorCode::InvalidPermission));
    }

    #[tokio::test]
    async fn test_ownership_scope_without_resource_id_is_invalid() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:update:own"]).await;

        let err = engine.has_permission(user, "posts:update:own").await.unwrap_err();
        assert!(err.is(ErrorCode::InvalidPermission));

        let err = engine.can(user, "posts", "update:own", None).await.unwrap_err();
        assert!(err.is(ErrorCode::InvalidPermission));
    }

    #[tokio::test]
    async fn test_any_and_all() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:create", "themes:read"]).await;

        assert!(engine
            .has_any_permission(user, &["themes:create", "themes:read"])
            .await
            .unwrap());
        assert!(!engine
            .has_any_permission(user, &["themes:create", "users:delete:any"])
            .await
            .unwrap());
        assert!(engine
            .has_all_permissions(user, &["posts:create", "themes:read"])
            .await
            .unwrap());
        assert!(!engine
            .has_all_permissions(user, &["posts:create", "themes:create"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_non_ownership_resource_permission_is_global() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:read:published"]).await;

        assert!(engine
            .check_resource_permission(user, "posts:read:published", "posts", Uuid::new_v4())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_self_scope_uses_resource_type() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["users:update:self"]).await;
        engine.ownership().register(
            "users",
            Arc::new(StaticOwnershipChecker::new().with_owner(user.0, user)),
        );

        assert!(engine
            .check_resource_permission(user, "users:update:self", "users", user.0)
            .await
            .unwrap());
        assert!(!engine
            .check_resource_permission(user, "users:update:self", "users", Uuid::new_v4())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_slow_ownership_check_is_canceled() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:update:own"])
            .await
            .with_timeout(Duration::from_millis(20));
        engine.ownership().register("posts", Arc::new(SlowChecker));

        let err = engine
            .can(user, "posts", "update", Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::Canceled));
    }

    #[tokio::test]
    async fn test_ownership_failure_is_not_denial() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:update:own"]).await;
        engine.ownership().register("posts", Arc::new(BrokenChecker));

        let err = engine
            .can(user, "posts", "update", Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::InternalError));
    }

    #[tokio::test]
    async fn test_roles_and_hints() {
        let user = UserId::new();
        let engine = engine_with_role(user, &["posts:create"]).await;

        assert!(engine.has_role(user, "tester").await.unwrap());
        assert!(!engine.has_role(user, "admin").await.unwrap());
        assert_eq!(engine.user_roles(user).await.unwrap(), vec!["tester".to_string()]);
        assert_eq!(
            engine.user_permissions(user).await.unwrap(),
            vec!["posts:create".to_string()]
        );
    }
}
