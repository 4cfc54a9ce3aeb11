//! HTTP surface of Scribe's authorization core.
//!
//! - `GET /health`, `GET /metrics` are unauthenticated
//! - everything under `/api/v1` requires a bearer token
//! - `POST /api/v1/users/profile` skips identity resolution; every other
//!   `/api/v1` route needs an existing profile and passes a route guard

mod extract;
mod handlers;
pub mod v1;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;
use crate::middleware::{auth::Authenticator, identity::IdentityResolver};
use crate::rbac::{PolicyEngine, RoleService};
use crate::users::UserDirectory;

pub use extract::{ApiJson, ApiPath};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PolicyEngine>,
    pub roles: RoleService,
    pub directory: Arc<dyn UserDirectory>,
    pub authenticator: Arc<Authenticator>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Absent when running against in-memory stores.
    pub db: Option<Database>,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the full router.
///
/// ```rust,ignore
/// let app = build_router(state);
/// axum::serve(listener, app).await?;
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(v1::V1_PREFIX, v1::v1_router(&state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Success body wrapper: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
