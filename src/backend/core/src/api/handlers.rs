//! API request handlers.
//!
//! Handlers return `Result<impl IntoResponse, ScribeError>`; errors render
//! through the envelope in [`crate::error`]. Authorization is enforced by the
//! route guards, so handlers only read the caller from the context.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::extract::{ApiJson, ApiPath};
use super::{ApiResponse, AppState};
use crate::error::{Result, ScribeError};
use crate::middleware::context::{CurrentUser, ResourceId, TokenIdentity};
use crate::rbac::models::{Permission, PermissionId, RoleId, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        None => "not_configured",
        Some(db) => match db.ping().await {
            Ok(()) => "up",
            Err(e) => {
                warn!(error = %e.chain(), "Health check could not reach the database");
                "down"
            }
        },
    };
    let status = if database == "down" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "healthy" } else { "degraded" },
            "database": database,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            String::new(),
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Profile & self
// ═══════════════════════════════════════════════════════════════════════════════

/// Creates the caller's profile. Mounted behind token authentication only,
/// since identity resolution would reject a caller with no profile yet.
pub async fn create_profile(
    State(state): State<AppState>,
    identity: TokenIdentity,
) -> Result<impl IntoResponse> {
    let profile = state
        .directory
        .create_profile(&identity.subject, &identity.email)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// `users:read:self` guarded; `ResourceId` is the profile being read.
pub async fn get_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> Result<impl IntoResponse> {
    let profile = state
        .directory
        .get(UserId(id))
        .await?
        .ok_or_else(|| ScribeError::resource_not_found("user", id))?;
    Ok(Json(ApiResponse::success(profile)))
}

#[derive(Debug, Serialize)]
pub struct AuthorizationSummary {
    pub user_id: UserId,
    pub permissions: Vec<String>,
    pub roles: Vec<String>,
}

/// Effective permissions and roles of the caller, for UI hints.
pub async fn my_authorization(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse> {
    let permissions = state.engine.user_permissions(user_id).await?;
    let roles = state.engine.user_roles(user_id).await?;
    Ok(Json(ApiResponse::success(AuthorizationSummary {
        user_id,
        permissions,
        roles,
    })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permissions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct PermissionView {
    /// Canonical `resource:action[:scope]` identifier.
    pub permission: String,
    #[serde(flatten)]
    pub row: Permission,
}

impl From<Permission> for PermissionView {
    fn from(row: Permission) -> Self {
        Self {
            permission: row.canonical_id(),
            row,
        }
    }
}

pub async fn list_permissions(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let permissions: Vec<PermissionView> = state
        .roles
        .get_all_permissions()
        .await?
        .into_iter()
        .map(PermissionView::from)
        .collect();
    Ok(Json(ApiResponse::success(permissions)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize)]
pub struct CloneTemplateRequest {
    pub template_id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RolePermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
}

pub async fn list_roles(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.roles.get_all_roles().await?)))
}

pub async fn list_templates(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.roles.list_templates().await?)))
}

pub async fn get_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RoleId>,
) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.roles.get_role(id).await?)))
}

pub async fn create_role(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRoleRequest>,
) -> Result<impl IntoResponse> {
    let role = state
        .roles
        .create_role_with_permissions(
            &req.name,
            &req.description,
            req.is_template,
            &req.permission_ids,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(role))))
}

pub async fn create_role_from_template(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CloneTemplateRequest>,
) -> Result<impl IntoResponse> {
    let role = state
        .roles
        .create_role_from_template(req.template_id, &req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(role))))
}

pub async fn update_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RoleId>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse> {
    let role = state
        .roles
        .update_role(id, req.name.as_deref(), req.description.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(role)))
}

pub async fn set_role_permissions(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RoleId>,
    ApiJson(req): ApiJson<RolePermissionsRequest>,
) -> Result<impl IntoResponse> {
    let role = state
        .roles
        .update_role_permissions(id, &req.permission_ids)
        .await?;
    Ok(Json(ApiResponse::success(role)))
}

pub async fn delete_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RoleId>,
) -> Result<impl IntoResponse> {
    state.roles.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════════════════════════
// User bindings
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: RoleId,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRolesRequest {
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission_id: PermissionId,
}

pub async fn get_user_roles(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<impl IntoResponse> {
    let grants = state.roles.get_user_roles_with_details(user_id).await?;
    Ok(Json(ApiResponse::success(grants)))
}

pub async fn assign_user_role(
    State(state): State<AppState>,
    CurrentUser(granted_by): CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(req): ApiJson<AssignRoleRequest>,
) -> Result<impl IntoResponse> {
    state
        .roles
        .assign_role_to_user(user_id, req.role_id, Some(granted_by))
        .await?;
    let grants = state.roles.get_user_roles_with_details(user_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(grants))))
}

pub async fn replace_user_roles(
    State(state): State<AppState>,
    CurrentUser(granted_by): CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(req): ApiJson<ReplaceRolesRequest>,
) -> Result<impl IntoResponse> {
    state
        .roles
        .replace_user_roles(user_id, &req.role_ids, Some(granted_by))
        .await?;
    let grants = state.roles.get_user_roles_with_details(user_id).await?;
    Ok(Json(ApiResponse::success(grants)))
}

pub async fn remove_user_role(
    State(state): State<AppState>,
    ApiPath((user_id, role_id)): ApiPath<(UserId, RoleId)>,
) -> Result<impl IntoResponse> {
    state.roles.remove_role_from_user(user_id, role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn grant_user_permission(
    State(state): State<AppState>,
    CurrentUser(granted_by): CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(req): ApiJson<GrantPermissionRequest>,
) -> Result<impl IntoResponse> {
    state
        .roles
        .grant_permission_to_user(user_id, req.permission_id, Some(granted_by))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke_user_permission(
    State(state): State<AppState>,
    ApiPath((user_id, permission_id)): ApiPath<(UserId, PermissionId)>,
) -> Result<impl IntoResponse> {
    state
        .roles
        .revoke_permission_from_user(user_id, permission_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
