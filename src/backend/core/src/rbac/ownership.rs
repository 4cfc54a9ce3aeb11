//! Ownership registry: resource type → "does user U own resource R?".
//!
//! Content subsystems register a checker per resource type at startup. The
//! decision engine consults the registry without depending on any content
//! module.

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::UserId;
use crate::config::OwnershipSource;
use crate::error::{ErrorCode, Result, ScribeError};

/// Answers ownership for one resource type.
///
/// Return `ResourceNotFound` for a missing resource; the registry treats that
/// as "not the owner".
#[async_trait]
pub trait OwnershipChecker: Send + Sync {
    async fn is_owner(&self, user_id: UserId, resource_id: Uuid) -> Result<bool>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct OwnershipRegistry {
    checkers: Arc<RwLock<HashMap<String, Arc<dyn OwnershipChecker>>>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the checker for `resource_type`.
    pub fn register(&self, resource_type: impl Into<String>, checker: Arc<dyn OwnershipChecker>) {
        let resource_type = resource_type.into();
        if self
            .checkers
            .write()
            .insert(resource_type.clone(), checker)
            .is_some()
        {
            debug!(resource_type = %resource_type, "Replaced ownership checker");
        }
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn OwnershipChecker>> {
        self.checkers.read().get(resource_type).cloned()
    }

    pub fn resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.checkers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Ask the registered checker. Unregistered types and missing resources
    /// both answer `false`; every other checker error propagates.
    pub async fn check(
        &self,
        user_id: UserId,
        resource_type: &str,
        resource_id: Uuid,
    ) -> Result<bool> {
        // Clone out of the lock so no guard is held across the await.
        let Some(checker) = self.get(resource_type) else {
            warn!(
                resource_type = %resource_type,
                "No ownership checker registered; treating as not owner"
            );
            return Ok(false);
        };

        match checker.is_owner(user_id, resource_id).await {
            Ok(owner) => Ok(owner),
            Err(e) if e.is(ErrorCode::ResourceNotFound) => {
                debug!(
                    resource_type = %resource_type,
                    resource_id = %resource_id,
                    "Resource not found during ownership check"
                );
                Ok(false)
            }
            Err(e) => Err(e.wrap(format!("ownership check for {}", resource_type))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Checkers
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads the owner column of a content table.
pub struct SqlOwnershipChecker {
    pool: PgPool,
    resource_type: String,
    table: String,
    query: String,
}

impl SqlOwnershipChecker {
    pub fn new(pool: PgPool, source: &OwnershipSource) -> Result<Self> {
        for ident in [&source.table, &source.id_column, &source.owner_column] {
            if !is_plain_identifier(ident) {
                return Err(ScribeError::configuration(format!(
                    "ownership source '{}' has an invalid identifier: {}",
                    source.resource_type, ident
                )));
            }
        }

        Ok(Self {
            pool,
            resource_type: source.resource_type.clone(),
            table: source.table.clone(),
            query: format!(
                "SELECT {} FROM {} WHERE {} = $1",
                source.owner_column, source.table, source.id_column
            ),
        })
    }

    /// Whether the backing table is visible on the current search path.
    pub async fn table_exists(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl OwnershipChecker for SqlOwnershipChecker {
    async fn is_owner(&self, user_id: UserId, resource_id: Uuid) -> Result<bool> {
        let owner: Option<Option<Uuid>> = sqlx::query_scalar(&self.query)
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;

        match owner {
            Some(owner) => Ok(owner == Some(user_id.0)),
            None => Err(ScribeError::resource_not_found(&self.resource_type, resource_id)),
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, optionally schema-qualified once.
fn is_plain_identifier(s: &str) -> bool {
    let part_ok = |p: &str| {
        let mut chars = p.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match s.split_once('.') {
        Some((schema, table)) => part_ok(schema) && part_ok(table),
        None => part_ok(s),
    }
}

/// A user owns exactly their own user record.
pub struct SelfOwnershipChecker;

#[async_trait]
impl OwnershipChecker for SelfOwnershipChecker {
    async fn is_owner(&self, user_id: UserId, resource_id: Uuid) -> Result<bool> {
        Ok(user_id.0 == resource_id)
    }
}

/// Fixed owner map. Handy for tests and for resource types whose owners are
/// known up front.
#[derive(Default)]
pub struct StaticOwnershipChecker {
    owners: RwLock<HashMap<Uuid, UserId>>,
}

impl StaticOwnershipChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(self, resource_id: Uuid, owner: UserId) -> Self {
        self.set_owner(resource_id, owner);
        self
    }

    pub fn set_owner(&self, resource_id: Uuid, owner: UserId) {
        self.owners.write().insert(resource_id, owner);
    }
}

#[async_trait]
impl OwnershipChecker for StaticOwnershipChecker {
    async fn is_owner(&self, user_id: UserId, resource_id: Uuid) -> Result<bool> {
        let owner = self.owners.read().get(&resource_id).copied();
        match owner {
            Some(owner) => Ok(owner == user_id),
            None => Err(ScribeError::resource_not_found("resource", resource_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingChecker;

    #[async_trait]
    impl OwnershipChecker for FailingChecker {
        async fn is_owner(&self, _user_id: UserId, _resource_id: Uuid) -> Result<bool> {
            Err(ScribeError::internal("content database unavailable"))
        }
    }

    #[tokio::test]
    async fn test_registered_checker_answers() {
        let registry = OwnershipRegistry::new();
        let owner = UserId::new();
        let post = Uuid::new_v4();
        registry.register(
            "posts",
            Arc::new(StaticOwnershipChecker::new().with_owner(post, owner)),
        );

        assert!(registry.check(owner, "posts", post).await.unwrap());
        assert!(!registry.check(UserId::new(), "posts", post).await.unwrap());
    }

    #[tokio::test]
    async fn test_unregistered_type_is_not_owner() {
        let registry = OwnershipRegistry::new();
        assert!(registry.get("themes").is_none());
        assert!(!registry
            .check(UserId::new(), "themes", Uuid::new_v4())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_owner() {
        let registry = OwnershipRegistry::new();
        registry.register("posts", Arc::new(StaticOwnershipChecker::new()));

        assert!(!registry
            .check(UserId::new(), "posts", Uuid::new_v4())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_checker_errors_propagate() {
        let registry = OwnershipRegistry::new();
        registry.register("posts", Arc::new(FailingChecker));

        let err = registry
            .check(UserId::new(), "posts", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::InternalError));
    }

    #[tokio::test]
    async fn test_register_replaces() {
        let registry = OwnershipRegistry::new();
        let owner = UserId::new();
        let post = Uuid::new_v4();
        registry.register("posts", Arc::new(FailingChecker));
        registry.register(
            "posts",
            Arc::new(StaticOwnershipChecker::new().with_owner(post, owner)),
        );

        assert!(registry.check(owner, "posts", post).await.unwrap());
        assert_eq!(registry.resource_types(), vec!["posts".to_string()]);
    }

    #[tokio::test]
    async fn test_self_checker() {
        let registry = OwnershipRegistry::new();
        registry.register("users", Arc::new(SelfOwnershipChecker));
        let user = UserId::new();

        assert!(registry.check(user, "users", user.0).await.unwrap());
        assert!(!registry.check(user, "users", Uuid::new_v4()).await.unwrap());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_plain_identifier("posts"));
        assert!(is_plain_identifier("content.posts"));
        assert!(is_plain_identifier("_owner_id"));
        assert!(!is_plain_identifier("posts; DROP TABLE users"));
        assert!(!is_plain_identifier("1posts"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("a.b.c"));
    }
}
