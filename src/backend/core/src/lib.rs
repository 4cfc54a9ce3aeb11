#![allow(clippy::result_large_err)]
//! # Scribe Core
//!
//! Authorization core of the Scribe multi-tenant blog backend.
//!
//! ## Architecture
//!
//! - **Permission Registry**: compiled-in catalog of `resource:action[:scope]` identifiers
//! - **Authorization Store**: permissions, roles and user bindings in PostgreSQL
//! - **Ownership Registry**: per-resource-type owner checks for `:own` / `:self` scopes
//! - **Decision Engine**: answers "can this user do this, optionally on this resource?"
//! - **Role Service**: role catalog and grant administration with system/template invariants
//! - **Middleware**: JWKS token verification, identity resolution and route guards
//! - **Observability**: structured logging, OpenTelemetry tracing and Prometheus metrics

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod rbac;
pub mod users;

pub use error::{ErrorCode, ErrorContext, ErrorKind, Result, ScribeError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ErrorCode, ErrorContext, ErrorKind, Result, ScribeError};
    pub use crate::middleware::{
        AuthLayer, Authenticator, Claims, CurrentUser, IdentityLayer, IdentityResolver,
        JwksCache, ResourceId, TokenIdentity,
    };
    pub use crate::rbac::{
        perms, registry, require_all_permissions, require_any_permission, require_ownership,
        require_permission, require_resource_permission, require_role, AuthorizeLayer,
        AuthzStore, InMemoryAuthzStore, OwnershipChecker, OwnershipRegistry, PermissionKey,
        PgAuthzStore, PolicyEngine, PredefinedRole, RoleService, UserId,
    };
    pub use crate::users::{InMemoryUserDirectory, PgUserDirectory, UserDirectory, UserProfile};
}
