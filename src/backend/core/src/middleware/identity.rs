//! Maps the verified token subject to the internal user id.
//!
//! Runs after [`AuthLayer`](super::auth::AuthLayer). A request that reached
//! this layer without a [`TokenIdentity`] is rejected as unauthorized; a
//! subject with no profile yet gets `UserProfileNotFound` so the client can
//! complete sign-up.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use super::context::{CurrentUser, TokenIdentity};
use crate::error::{ErrorCode, Result, ScribeError};
use crate::rbac::models::UserId;
use crate::users::UserDirectory;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, identity: &TokenIdentity) -> Result<UserId>;
}

/// Looks the subject up in the user directory.
pub struct DirectoryIdentityResolver {
    directory: Arc<dyn UserDirectory>,
}

impl DirectoryIdentityResolver {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl IdentityResolver for DirectoryIdentityResolver {
    async fn resolve(&self, identity: &TokenIdentity) -> Result<UserId> {
        self.directory
            .find_by_external_id(&identity.subject)
            .await?
            .map(|profile| profile.id)
            .ok_or_else(ScribeError::user_profile_not_found)
    }
}

/// Reads the internal id from a custom claim the identity provider stamps
/// into the token.
pub struct ClaimIdentityResolver {
    claim: String,
}

impl ClaimIdentityResolver {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for ClaimIdentityResolver {
    async fn resolve(&self, identity: &TokenIdentity) -> Result<UserId> {
        let Some(raw) = identity.claims.custom_str(&self.claim) else {
            return Err(ScribeError::user_profile_not_found());
        };
        Uuid::parse_str(raw).map(UserId).map_err(|e| {
            ScribeError::internal(format!("claim {} is not a valid user id", self.claim))
                .with_source(e)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct IdentityLayer {
    resolver: Arc<dyn IdentityResolver>,
}

impl IdentityLayer {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService {
            inner,
            resolver: self.resolver.clone(),
        }
    }
}

#[derive(Clone)]
pub struct IdentityService<S> {
    inner: S,
    resolver: Arc<dyn IdentityResolver>,
}

impl<S> Service<Request<Body>> for IdentityService<S>
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

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let resolver = self.resolver.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(identity) = request.extensions().get::<TokenIdentity>().cloned() else {
                return Ok(ScribeError::unauthorized("Authentication required").into_response());
            };

            match resolver.resolve(&identity).await {
                Ok(user_id) => {
                    request.extensions_mut().insert(CurrentUser(user_id));
                    inner.call(request).await
                }
                Err(e) => {
                    if e.is(ErrorCode::UserProfileNotFound) {
                        debug!(subject = %identity.subject, "No profile for token subject");
                    }
                    Ok(e.into_response())
                }
            }
        })
    }
}
