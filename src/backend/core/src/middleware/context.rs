//! Typed request context shared by the authentication, identity and
//! authorization layers.
//!
//! Each layer inserts one of these into the request extensions; handlers and
//! later layers read them back through the extractors below. Keys are types,
//! so no layer can collide with another by accident.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use super::auth::Claims;
use crate::error::ScribeError;
use crate::rbac::models::UserId;

/// Verified token subject and email.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub subject: String,
    pub email: String,
    pub claims: Claims,
}

/// Internal user id resolved from the token subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

/// Resource id parsed by a resource guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for TokenIdentity
where
    S: Send + Sync,
{
    type Rejection = ScribeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TokenIdentity>()
            .cloned()
            .ok_or_else(|| ScribeError::unauthorized("Authentication required"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ScribeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or_else(|| ScribeError::unauthorized("Authentication required"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ResourceId
where
    S: Send + Sync,
{
    type Rejection = ScribeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ResourceId>().copied().ok_or_else(|| {
            ScribeError::internal("resource id requested on a route without a resource guard")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::http::Request;

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let (mut parts, _) = Request::new(()).into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(err.is(ErrorCode::Unauthorized));
    }

    #[tokio::test]
    async fn test_reads_inserted_user() {
        let user = UserId::new();
        let mut request = Request::new(());
        request.extensions_mut().insert(CurrentUser(user));
        let (mut parts, _) = request.into_parts();

        let extracted = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted.0, user);
    }
}
