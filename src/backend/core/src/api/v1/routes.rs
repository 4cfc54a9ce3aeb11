//! V1 API routes.
//!
//! Every route sits behind bearer authentication. Apart from profile
//! creation, every route also sits behind identity resolution and a route
//! guard naming the permission it needs.

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::api::{handlers, AppState};
use crate::middleware::{AuthLayer, IdentityLayer};
use crate::rbac::middleware::{require_permission, require_resource_permission};
use crate::rbac::perms;

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router.
///
/// # Endpoints
///
/// ## Self
/// - `POST /users/profile` - Create the caller's profile (token only)
/// - `GET /me/authorization` - Caller's effective permissions and roles
/// - `GET /users/:id` - Read a profile (`users:read:self`, or `users:read:any`)
///
/// ## Catalog
/// - `GET /permissions` (`authz:permissions:read`)
/// - `GET /roles`, `GET /roles/templates`, `GET /roles/:id` (`authz:roles:read`)
/// - `POST /roles`, `POST /roles/from-template` (`authz:roles:create`)
/// - `PUT /roles/:id`, `PUT /roles/:id/permissions` (`authz:roles:update`)
/// - `DELETE /roles/:id` (`authz:roles:delete`)
///
/// ## User bindings
/// - `GET /users/:id/roles` (`authz:users:read`)
/// - `POST /users/:id/roles`, `PUT /users/:id/roles`, `POST /users/:id/permissions` (`authz:users:assign`)
/// - `DELETE /users/:id/roles/:role_id`, `DELETE /users/:id/permissions/:permission_id` (`authz:users:revoke`)
pub fn v1_router(state: &AppState) -> Router<AppState> {
    let engine = &state.engine;
    let guard = |permission: &str| require_permission(engine.clone(), permission);

    let resolved = Router::new()
        .route("/me/authorization", get(handlers::my_authorization))
        .route(
            "/users/:id",
            get(handlers::get_user).route_layer(require_resource_permission(
                engine.clone(),
                perms::USERS_READ_SELF,
                "users",
                "id",
            )),
        )
        // Catalog
        .route(
            "/permissions",
            get(handlers::list_permissions).route_layer(guard(perms::AUTHZ_PERMISSIONS_READ)),
        )
        .route(
            "/roles",
            get(handlers::list_roles).route_layer(guard(perms::AUTHZ_ROLES_READ)),
        )
        .route(
            "/roles",
            post(handlers::create_role).route_layer(guard(perms::AUTHZ_ROLES_CREATE)),
        )
        .route(
            "/roles/templates",
            get(handlers::list_templates).route_layer(guard(perms::AUTHZ_ROLES_READ)),
        )
        .route(
            "/roles/from-template",
            post(handlers::create_role_from_template)
                .route_layer(guard(perms::AUTHZ_ROLES_CREATE)),
        )
        .route(
            "/roles/:id",
            get(handlers::get_role).route_layer(guard(perms::AUTHZ_ROLES_READ)),
        )
        .route(
            "/roles/:id",
            put(handlers::update_role).route_layer(guard(perms::AUTHZ_ROLES_UPDATE)),
        )
        .route(
            "/roles/:id",
            delete(handlers::delete_role).route_layer(guard(perms::AUTHZ_ROLES_DELETE)),
        )
        .route(
            "/roles/:id/permissions",
            put(handlers::set_role_permissions).route_layer(guard(perms::AUTHZ_ROLES_UPDATE)),
        )
        // User bindings
        .route(
            "/users/:id/roles",
            get(handlers::get_user_roles).route_layer(guard(perms::AUTHZ_USERS_READ)),
        )
        .route(
            "/users/:id/roles",
            post(handlers::assign_user_role).route_layer(guard(perms::AUTHZ_USERS_ASSIGN)),
        )
        .route(
            "/users/:id/roles",
            put(handlers::replace_user_roles).route_layer(guard(perms::AUTHZ_USERS_ASSIGN)),
        )
        .route(
            "/users/:id/roles/:role_id",
            delete(handlers::remove_user_role).route_layer(guard(perms::AUTHZ_USERS_REVOKE)),
        )
        .route(
            "/users/:id/permissions",
            post(handlers::grant_user_permission).route_layer(guard(perms::AUTHZ_USERS_ASSIGN)),
        )
        .route(
            "/users/:id/permissions/:permission_id",
            delete(handlers::revoke_user_permission)
                .route_layer(guard(perms::AUTHZ_USERS_REVOKE)),
        )
        .layer(IdentityLayer::new(state.identity.clone()));

    Router::new()
        .route("/users/profile", post(handlers::create_profile))
        .merge(resolved)
        .layer(AuthLayer::new(state.authenticator.clone()))
}

/// Route constants for clients and documentation.
pub mod paths {
    pub const PROFILE: &str = "/api/v1/users/profile";
    pub const ME_AUTHORIZATION: &str = "/api/v1/me/authorization";
    pub const PERMISSIONS: &str = "/api/v1/permissions";
    pub const ROLES: &str = "/api/v1/roles";
    pub const ROLE_TEMPLATES: &str = "/api/v1/roles/templates";
    pub const ROLE_FROM_TEMPLATE: &str = "/api/v1/roles/from-template";
    pub const ROLE: &str = "/api/v1/roles/:id";
    pub const ROLE_PERMISSIONS: &str = "/api/v1/roles/:id/permissions";
    pub const USER: &str = "/api/v1/users/:id";
    pub const USER_ROLES: &str = "/api/v1/users/:id/roles";
    pub const USER_ROLE: &str = "/api/v1/users/:id/roles/:role_id";
    pub const USER_PERMISSIONS: &str = "/api/v1/users/:id/permissions";
    pub const USER_PERMISSION: &str = "/api/v1/users/:id/permissions/:permission_id";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_constants() {
        for path in [paths::PROFILE, paths::ROLES, paths::USER_ROLE, paths::PERMISSIONS] {
            assert!(path.starts_with(V1_PREFIX));
        }
    }
}
