//! Role-based access control with ownership-scoped permissions.
//!
//! - **Registry**: the compiled-in catalog of valid permission identifiers
//! - **Store**: persisted permissions, roles and user bindings
//! - **Ownership**: per-resource-type "is this user the owner" checkers
//! - **Policy Engine**: answers authorization questions from the above
//! - **Role Service**: administrative role and grant management
//! - **Middleware**: route guards built on the policy engine
//!
//! # Usage
//!
//! ```rust,ignore
//! use scribe_core::rbac::{OwnershipRegistry, PgAuthzStore, PolicyEngine};
//!
//! let store = Arc::new(PgAuthzStore::new(pool.clone()));
//! scribe_core::rbac::seed(store.as_ref()).await?;
//!
//! let engine = PolicyEngine::new(store, OwnershipRegistry::new());
//! let allowed = engine.can(user_id, "posts", "update", Some(post_id)).await?;
//! ```

pub mod middleware;
pub mod models;
pub mod ownership;
pub mod policy;
pub mod registry;
pub mod roles;
pub mod seed;
pub mod service;
pub mod store;

pub use middleware::{
    require_all_permissions, require_any_permission, require_ownership, require_permission,
    require_resource_permission, require_role, AuthorizeLayer, AuthorizeService, Requirement,
};
pub use models::{
    DirectGrant, NewPermission, NewRole, Permission, PermissionId, Role, RoleChanges, RoleGrant,
    RoleId, UserAuthorization, UserId, UserPermissionBinding, UserRoleBinding,
};
pub use ownership::{
    OwnershipChecker, OwnershipRegistry, SelfOwnershipChecker, SqlOwnershipChecker,
    StaticOwnershipChecker,
};
pub use policy::PolicyEngine;
pub use registry::{perms, registry, PermissionKey, PermissionRegistry, RegisteredPermission};
pub use roles::PredefinedRole;
pub use seed::{seed, SeedReport};
pub use service::RoleService;
pub use store::{AuthzStore, InMemoryAuthzStore, PgAuthzStore};
