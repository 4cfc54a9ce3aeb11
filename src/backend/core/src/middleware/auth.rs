//! Bearer token authentication against the identity provider's JWKS.
//!
//! The provider signs access tokens with keys published at a JWKS endpoint.
//! [`JwksCache`] keeps those keys in memory and refreshes them periodically;
//! [`Authenticator`] verifies signature, expiry, issuer and (optionally)
//! audience, then requires `sub` and `email` to be present.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe_core::middleware::auth::{AuthLayer, Authenticator, JwksCache};
//!
//! let jwks = Arc::new(JwksCache::new(&settings.jwks_url));
//! jwks.refresh().await?;
//! let authenticator = Arc::new(Authenticator::new(&settings, jwks)?);
//!
//! let app = Router::new()
//!     .route("/api/v1/profile", get(profile))
//!     .layer(AuthLayer::new(authenticator));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    str::FromStr,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::task::JoinHandle;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use super::context::TokenIdentity;
use crate::config::AuthSettings;
use crate::error::{ErrorCode, Result, ScribeError};
use crate::observability::metrics::{record_auth_failure, record_jwks_refresh};

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// Access token claims. Anything beyond the registered claims lands in
/// `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub iss: String,

    /// String or array, as issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    pub exp: i64,

    #[serde(default)]
    pub iat: i64,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// A string-valued custom claim.
    pub fn custom_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(|v| v.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JWKS cache
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory signing keys indexed by `kid`.
pub struct JwksCache {
    url: Option<String>,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl JwksCache {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            client: reqwest::Client::builder()
                .timeout(JWKS_FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Fixed keys with no remote endpoint; `refresh` becomes a no-op.
    pub fn with_static_keys(keys: HashMap<String, DecodingKey>) -> Self {
        Self {
            url: None,
            client: reqwest::Client::new(),
            keys: RwLock::new(keys),
        }
    }

    pub fn key(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the key set and replace the cached keys. On failure the previous
    /// keys stay in place.
    pub async fn refresh(&self) -> Result<usize> {
        let Some(url) = &self.url else {
            return Ok(self.len());
        };

        let result = self.fetch(url).await;
        record_jwks_refresh(result.is_ok());

        let keys = result.map_err(|e| e.wrap(format!("refreshing JWKS from {}", url)))?;
        let count = keys.len();
        *self.keys.write() = keys;

        info!(keys = count, "JWKS refreshed");
        Ok(count)
    }

    async fn fetch(&self, url: &str) -> Result<HashMap<String, DecodingKey>> {
        let set: JwkSet = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::with_capacity(set.keys.len());
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }
        Ok(keys)
    }

    /// Refresh on a fixed interval until the handle is aborted.
    pub fn spawn_refresh(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately; startup already refreshed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e.chain(), "JWKS refresh failed; keeping previous keys");
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Authenticator {
    jwks: Arc<JwksCache>,
    validation: Validation,
}

impl Authenticator {
    pub fn new(settings: &AuthSettings, jwks: Arc<JwksCache>) -> Result<Self> {
        if settings.issuer.trim().is_empty() {
            return Err(ScribeError::configuration("auth.issuer must be set"));
        }

        let algorithms = settings
            .algorithms
            .iter()
            .map(|a| {
                Algorithm::from_str(a).map_err(|_| {
                    ScribeError::configuration(format!("unsupported JWT algorithm: {}", a))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let Some(first) = algorithms.first().copied() else {
            return Err(ScribeError::configuration("auth.algorithms must not be empty"));
        };

        let mut validation = Validation::new(first);
        validation.algorithms = algorithms;
        validation.leeway = settings.leeway_secs;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self { jwks, validation })
    }

    pub fn jwks(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    /// Verify the bearer token in `headers`.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<TokenIdentity> {
        let token = extract_bearer(headers)?;
        self.verify(token)
    }

    pub fn verify(&self, token: &str) -> Result<TokenIdentity> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| invalid_token("token header has no kid"))?;
        let key = self
            .jwks
            .key(&kid)
            .ok_or_else(|| invalid_token(format!("no signing key for kid {}", kid)))?;

        let mut claims = decode::<Claims>(token, &key, &self.validation)?.claims;

        // The directory keys profiles on the trimmed subject.
        claims.sub = claims.sub.trim().to_string();
        if claims.sub.is_empty() {
            return Err(invalid_token("token has no subject"));
        }
        let email = match claims.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => return Err(invalid_token("token has no email")),
        };

        Ok(TokenIdentity {
            subject: claims.sub.clone(),
            email,
            claims,
        })
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ScribeError::unauthorized("Missing bearer token"))?
        .to_str()
        .map_err(|_| invalid_token("authorization header is not ASCII"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(ScribeError::unauthorized("Missing bearer token")),
    }
}

fn invalid_token(internal: impl Into<String>) -> ScribeError {
    ScribeError::with_internal(ErrorCode::InvalidToken, "The provided token is invalid", internal)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejects requests without a valid bearer token and inserts
/// [`TokenIdentity`] for the rest.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
}

impl AuthLayer {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
}

impl<S> Service<Request<Body>> for AuthService<S>
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
        let authenticator = self.authenticator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match authenticator.authenticate(request.headers()) {
                Ok(identity) => {
                    debug!(subject = %identity.subject, "Token verified");
                    request.extensions_mut().insert(identity);
                    inner.call(request).await
                }
                Err(e) => {
                    record_auth_failure(&e.code().to_string());
                    Ok(e.into_response())
                }
            }
        })
    }
}
