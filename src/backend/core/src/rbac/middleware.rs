//! Route guards that enforce authorization requirements on requests.
//!
//! Guards read the [`CurrentUser`] inserted by the identity layer and ask the
//! [`PolicyEngine`]. A denial becomes `403 Forbidden`; an engine error is
//! rendered as-is and never turned into a denial.
//!
//! Resource guards read a UUID path parameter, so they must be attached with
//! `route_layer` where the matched path is known.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe_core::rbac::middleware::{require_ownership, require_permission};
//!
//! let app = Router::new()
//!     .route("/posts", post(create_post).route_layer(require_permission(engine.clone(), "posts:create")))
//!     .route("/posts/:id", put(update_post).route_layer(require_ownership(engine, "posts", "id", "update")));
//! ```

use axum::{
    body::Body,
    extract::{FromRequestParts, Path, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;
use uuid::Uuid;

use super::policy::PolicyEngine;
use crate::error::{Result, ScribeError};
use crate::middleware::context::{CurrentUser, ResourceId};
use crate::rbac::models::UserId;

/// What a guard demands of the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permission(String),
    AnyPermission(Vec<String>),
    AllPermissions(Vec<String>),
    Role(String),
    /// `permission` checked against the resource whose id is in path
    /// parameter `param`.
    ResourcePermission {
        permission: String,
        resource_type: String,
        param: String,
    },
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission(p) => write!(f, "{}", p),
            Self::AnyPermission(ps) => write!(f, "any of [{}]", ps.join(", ")),
            Self::AllPermissions(ps) => write!(f, "all of [{}]", ps.join(", ")),
            Self::Role(r) => write!(f, "role {}", r),
            Self::ResourcePermission { permission, .. } => write!(f, "{}", permission),
        }
    }
}

pub fn require_permission(engine: Arc<PolicyEngine>, permission: &str) -> AuthorizeLayer {
    AuthorizeLayer::new(engine, Requirement::Permission(permission.to_string()))
}

pub fn require_any_permission(engine: Arc<PolicyEngine>, permissions: &[&str]) -> AuthorizeLayer {
    AuthorizeLayer::new(
        engine,
        Requirement::AnyPermission(permissions.iter().map(|p| p.to_string()).collect()),
    )
}

pub fn require_all_permissions(engine: Arc<PolicyEngine>, permissions: &[&str]) -> AuthorizeLayer {
    AuthorizeLayer::new(
        engine,
        Requirement::AllPermissions(permissions.iter().map(|p| p.to_string()).collect()),
    )
}

pub fn require_role(engine: Arc<PolicyEngine>, role: &str) -> AuthorizeLayer {
    AuthorizeLayer::new(engine, Requirement::Role(role.to_string()))
}

pub fn require_resource_permission(
    engine: Arc<PolicyEngine>,
    permission: &str,
    resource_type: &str,
    param: &str,
) -> AuthorizeLayer {
    AuthorizeLayer::new(
        engine,
        Requirement::ResourcePermission {
            permission: permission.to_string(),
            resource_type: resource_type.to_string(),
            param: param.to_string(),
        },
    )
}

/// Shorthand for `resource_type:action:own` on the resource in `param`.
pub fn require_ownership(
    engine: Arc<PolicyEngine>,
    resource_type: &str,
    param: &str,
    action: &str,
) -> AuthorizeLayer {
    require_resource_permission(
        engine,
        &format!("{}:{}:own", resource_type, action),
        resource_type,
        param,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AuthorizeLayer {
    engine: Arc<PolicyEngine>,
    requirement: Arc<Requirement>,
}

impl AuthorizeLayer {
    pub fn new(engine: Arc<PolicyEngine>, requirement: Requirement) -> Self {
        Self {
            engine,
            requirement: Arc::new(requirement),
        }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            engine: self.engine.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    engine: Arc<PolicyEngine>,
    requirement: Arc<Requirement>,
}

impl<S> Service<Request<Body>> for AuthorizeService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let engine = self.engine.clone();
        let requirement = self.requirement.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();

            let Some(CurrentUser(user_id)) = parts.extensions.get::<CurrentUser>().copied() else {
                return Ok(ScribeError::unauthorized("Authentication required").into_response());
            };

            let resource_id = match resource_param(&requirement, &mut parts).await {
                Ok(id) => id,
                Err(e) => return Ok(e.into_response()),
            };

            match evaluate(&engine, &requirement, user_id, resource_id).await {
                Ok(true) => {
                    if let Some(id) = resource_id {
                        parts.extensions.insert(ResourceId(id));
                    }
                    inner.call(Request::from_parts(parts, body)).await
                }
                Ok(false) => {
                    warn!(
                        user_id = %user_id,
                        requirement = %requirement,
                        path = %parts.uri.path(),
                        "Access denied"
                    );
                    Ok(ScribeError::forbidden("You do not have permission to perform this action")
                        .with_context("required", requirement.to_string())
                        .into_response())
                }
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

/// Parse the guarded resource id out of the matched path.
async fn resource_param(
    requirement: &Requirement,
    parts: &mut axum::http::request::Parts,
) -> Result<Option<Uuid>> {
    let Requirement::ResourcePermission { param, .. } = requirement else {
        return Ok(None);
    };

    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, &())
        .await
        .map_err(|e| {
            ScribeError::internal(format!("resource guard on a route without path parameters: {}", e))
        })?;
    let raw = params.get(param).ok_or_else(|| {
        ScribeError::internal(format!("route has no path parameter named {}", param))
    })?;

    Uuid::parse_str(raw).map(Some).map_err(|_| {
        ScribeError::validation("Resource id must be a UUID").with_context(param.as_str(), raw.as_str())
    })
}

async fn evaluate(
    engine: &PolicyEngine,
    requirement: &Requirement,
    user_id: UserId,
    resource_id: Option<Uuid>,
) -> Result<bool> {
    match requirement {
        Requirement::Permission(p) => engine.has_permission(user_id, p).await,
        Requirement::AnyPermission(ps) => {
            let ps: Vec<&str> = ps.iter().map(String::as_str).collect();
            engine.has_any_permission(user_id, &ps).await
        }
        Requirement::AllPermissions(ps) => {
            let ps: Vec<&str> = ps.iter().map(String::as_str).collect();
            engine.has_all_permissions(user_id, &ps).await
        }
        Requirement::Role(r) => engine.has_role(user_id, r).await,
        Requirement::ResourcePermission {
            permission,
            resource_type,
            ..
        } => {
            let Some(resource_id) = resource_id else {
                return Err(ScribeError::internal("resource guard evaluated without a resource id"));
            };
            engine
                .check_resource_permission(user_id, permission, resource_type, resource_id)
                .await
        }
    }
}
