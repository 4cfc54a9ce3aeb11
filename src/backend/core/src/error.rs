//! Error handling for Scribe Core.
//!
//! This module provides:
//! - A single error type carrying a stable [`ErrorCode`] (kind identity)
//! - The general [`ErrorKind`] that becomes the `error` field of the HTTP envelope
//! - Optional business codes for admin-facing failures
//! - Error chaining with internal context that never reaches clients
//! - Logging with tracing and an error counter
//!
//! # Usage
//!
//! ```rust,ignore
//! use scribe_core::error::{ErrorCode, Result, ScribeError};
//!
//! fn load(role: Option<Role>) -> Result<Role> {
//!     role.ok_or_else(|| ScribeError::role_not_found(role_id))
//! }
//!
//! match service.delete_role(id).await {
//!     Err(e) if e.is(ErrorCode::CannotDeleteSystemRole) => { /* ... */ }
//!     other => other?,
//! }
//! ```

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Scribe operations.
pub type Result<T> = std::result::Result<T, ScribeError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Kinds
// ═══════════════════════════════════════════════════════════════════════════════

/// General error kind, rendered as the `error` field of the HTTP envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    ValidationError,
    BadRequest,
    Conflict,
    InvalidToken,
    TokenExpired,
    InternalServerError,
    Canceled,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::ValidationError => "validation_error",
            Self::BadRequest => "bad_request",
            Self::Conflict => "conflict",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::InternalServerError => "internal_server_error",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// The code is the identity of an error: two errors are "the same kind" iff
/// their codes are equal, regardless of message or wrapped cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Catalog errors
    InvalidPermission,
    PermissionNotFound,
    RoleNotFound,
    RoleNameExists,
    CannotUpdateSystemRole,
    CannotDeleteSystemRole,
    TemplateCannotAssign,
    NotATemplate,

    // Binding errors
    RoleNotAssigned,
    PermissionNotGranted,
    DuplicateBinding,

    // Content lookups
    ResourceNotFound,

    // Request validation
    ValidationError,

    // Authentication / authorization
    Unauthorized,
    Forbidden,
    InvalidToken,
    InvalidIssuer,
    TokenExpired,
    UserProfileNotFound,

    // Infrastructure
    DatabaseError,
    ConfigurationError,
    InternalError,
    Canceled,
}

impl ErrorCode {
    /// The general kind this code belongs to.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPermission | Self::ValidationError => ErrorKind::ValidationError,

            Self::PermissionNotFound
            | Self::RoleNotFound
            | Self::RoleNotAssigned
            | Self::PermissionNotGranted
            | Self::ResourceNotFound
            | Self::UserProfileNotFound => ErrorKind::NotFound,

            Self::RoleNameExists
            | Self::CannotUpdateSystemRole
            | Self::CannotDeleteSystemRole
            | Self::DuplicateBinding => ErrorKind::Conflict,

            Self::TemplateCannotAssign | Self::NotATemplate => ErrorKind::BadRequest,

            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::InvalidToken | Self::InvalidIssuer => ErrorKind::InvalidToken,
            Self::TokenExpired => ErrorKind::TokenExpired,

            Self::DatabaseError | Self::ConfigurationError | Self::InternalError => {
                ErrorKind::InternalServerError
            }
            Self::Canceled => ErrorKind::Canceled,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Unauthorized | ErrorKind::InvalidToken | ErrorKind::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ValidationError | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            // nginx's "client closed request"; never seen by a live client.
            ErrorKind::Canceled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
        }
    }

    /// Business code surfaced to admin clients, if this code has one.
    pub const fn business_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPermission => Some("INVALID_PERMISSION"),
            Self::PermissionNotFound => Some("PERMISSION_NOT_FOUND"),
            Self::RoleNotFound => Some("ROLE_NOT_FOUND"),
            Self::RoleNameExists => Some("ROLE_NAME_EXISTS"),
            Self::CannotUpdateSystemRole => Some("CANNOT_UPDATE_SYSTEM_ROLE"),
            Self::CannotDeleteSystemRole => Some("CANNOT_DELETE_SYSTEM_ROLE"),
            Self::TemplateCannotAssign => Some("TEMPLATE_CANNOT_ASSIGN"),
            Self::NotATemplate => Some("NOT_A_TEMPLATE"),
            Self::RoleNotAssigned => Some("ROLE_NOT_ASSIGNED"),
            Self::PermissionNotGranted => Some("PERMISSION_NOT_GRANTED"),
            Self::DuplicateBinding => Some("DUPLICATE_BINDING"),
            Self::ResourceNotFound => Some("RESOURCE_NOT_FOUND"),
            Self::UserProfileNotFound => Some("USER_PROFILE_NOT_FOUND"),
            Self::InvalidIssuer => Some("INVALID_ISSUER"),
            _ => None,
        }
    }

    /// Whether errors of this code are logged as failures of the service
    /// rather than of the caller.
    pub const fn is_server_fault(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalServerError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Scribe Core.
#[derive(Error, Debug)]
pub struct ScribeError {
    /// Kind identity
    code: ErrorCode,

    /// Message safe to expose to clients
    user_message: Cow<'static, str>,

    /// Detailed message for logs only
    internal_message: Option<String>,

    /// Rendered as the envelope's `context` object
    context: BTreeMap<String, serde_json::Value>,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for ScribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ScribeError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            context: BTreeMap::new(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn canceled(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Canceled, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add a key to the `context` object of the envelope.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Prefix the internal message with `message`, keeping the code.
    pub fn wrap(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.internal_message = Some(match self.internal_message.take() {
            Some(inner) => format!("{}: {}", message, inner),
            None => message,
        });
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Kind identity check, independent of message and cause.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Render the cause chain (`self: cause: cause ...`) for logs.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            current = cause.source();
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error at a level matching who is at fault.
    pub fn log(&self) {
        let code = self.code.to_string();
        let status = self.http_status().as_u16();

        if self.code.is_server_fault() {
            error!(
                error_code = %code,
                http_status = status,
                chain = %self.chain(),
                "Request failed with internal error"
            );
        } else if matches!(
            self.kind(),
            ErrorKind::Forbidden | ErrorKind::Unauthorized | ErrorKind::InvalidToken
        ) {
            warn!(
                error_code = %code,
                http_status = status,
                user_message = %self.user_message,
                "Request rejected"
            );
        } else {
            debug!(
                error_code = %code,
                http_status = status,
                user_message = %self.user_message,
                "Request failed"
            );
        }
    }

    fn record_metrics(&self) {
        counter!(
            "scribe_errors_total",
            "code" => self.code.to_string(),
            "kind" => self.code.kind().as_str(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog Constructors
// ═══════════════════════════════════════════════════════════════════════════════

impl ScribeError {
    pub fn invalid_permission(permission: impl Into<String>) -> Self {
        let permission = permission.into();
        Self::new(
            ErrorCode::InvalidPermission,
            format!("Invalid permission: {}", permission),
        )
        .with_context("permission", permission)
    }

    pub fn permission_not_found(permission: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::PermissionNotFound,
            format!("Permission not found: {}", permission),
        )
        .with_context("permission", permission.to_string())
    }

    pub fn role_not_found(role: impl fmt::Display) -> Self {
        Self::new(ErrorCode::RoleNotFound, format!("Role not found: {}", role))
            .with_context("role", role.to_string())
    }

    pub fn role_name_exists(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::RoleNameExists,
            format!("A role named '{}' already exists", name),
        )
        .with_context("name", name)
    }

    pub fn cannot_update_system_role(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::CannotUpdateSystemRole,
            format!("System role '{}' cannot be modified", name),
        )
        .with_context("role", name)
    }

    pub fn cannot_delete_system_role(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::CannotDeleteSystemRole,
            format!("System role '{}' cannot be deleted", name),
        )
        .with_context("role", name)
    }

    pub fn template_cannot_assign(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::TemplateCannotAssign,
            format!("Template role '{}' cannot be assigned to users", name),
        )
        .with_context("role", name)
    }

    pub fn not_a_template(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::NotATemplate,
            format!("Role '{}' is not a template", name),
        )
        .with_context("role", name)
    }

    pub fn role_not_assigned(user: impl fmt::Display, role: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RoleNotAssigned,
            "Role is not assigned to this user",
        )
        .with_context("user_id", user.to_string())
        .with_context("role_id", role.to_string())
    }

    pub fn permission_not_granted(user: impl fmt::Display, permission: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::PermissionNotGranted,
            "Permission is not granted to this user",
        )
        .with_context("user_id", user.to_string())
        .with_context("permission_id", permission.to_string())
    }

    pub fn resource_not_found(resource_type: impl Into<String>, id: impl fmt::Display) -> Self {
        let resource_type = resource_type.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found: {}", resource_type, id),
        )
        .with_context("resource_type", resource_type)
        .with_context("resource_id", id.to_string())
    }

    pub fn user_profile_not_found() -> Self {
        Self::new(
            ErrorCode::UserProfileNotFound,
            "User profile has not been created yet",
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            message,
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body: `{error, message, business_code?, context?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, serde_json::Value>>,
}

impl From<&ScribeError> for ErrorResponse {
    fn from(error: &ScribeError) -> Self {
        Self {
            error: error.kind(),
            message: error.user_message.to_string(),
            business_code: error.code.business_code().map(str::to_string),
            context: if error.context.is_empty() || error.code.is_server_fault() {
                None
            } else {
                Some(error.context.clone())
            },
        }
    }
}

impl IntoResponse for ScribeError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        if self.code == ErrorCode::Canceled {
            return status.into_response();
        }

        let body = ErrorResponse::from(&self);
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            Json(body),
        )
            .into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Wrap as an internal error with a message.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Convert with a specific error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ScribeError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| ScribeError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ScribeError::new(ErrorCode::ResourceNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| ScribeError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Postgres SQLSTATE for unique violations.
pub(crate) const PG_UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for foreign key violations.
pub(crate) const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for ScribeError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::ResourceNotFound,
                "The requested record was not found",
            ),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => (
                    ErrorCode::DuplicateBinding,
                    "A record with these values already exists",
                ),
                Some(PG_FOREIGN_KEY_VIOLATION) => (
                    ErrorCode::ResourceNotFound,
                    "A referenced record does not exist",
                ),
                _ => (ErrorCode::DatabaseError, "A database error occurred"),
            },
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for ScribeError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::DatabaseError,
            "Database migration failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for ScribeError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<reqwest::Error> for ScribeError {
    fn from(error: reqwest::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "Failed to reach an upstream service",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<jsonwebtoken::errors::Error> for ScribeError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtKind;

        let (code, user_msg) = match error.kind() {
            JwtKind::ExpiredSignature => (
                ErrorCode::TokenExpired,
                "The authentication token has expired",
            ),
            JwtKind::InvalidIssuer => (
                ErrorCode::InvalidIssuer,
                "The token was not issued by a trusted issuer",
            ),
            _ => (ErrorCode::InvalidToken, "The provided token is invalid"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for ScribeError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(ErrorCode::Canceled, "Operation timed out", error.to_string())
            .with_source(error)
    }
}

impl From<config::ConfigError> for ScribeError {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration(error.to_string()).with_source(error)
    }
}

impl From<axum::extract::rejection::PathRejection> for ScribeError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<axum::extract::rejection::JsonRejection> for ScribeError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<anyhow::Error> for ScribeError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ScribeError>() {
            Ok(scribe_error) => scribe_error,
            Err(error) => Self::internal(format!("{:#}", error)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::RoleNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::InvalidPermission.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::RoleNameExists.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::CannotDeleteSystemRole.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TemplateCannotAssign.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::TokenExpired.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::UserProfileNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DatabaseError.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::Canceled.http_status().as_u16(), 499);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorCode::InvalidPermission.kind().as_str(), "validation_error");
        assert_eq!(ErrorCode::TokenExpired.kind().as_str(), "token_expired");
        assert_eq!(ErrorCode::InvalidIssuer.kind().as_str(), "invalid_token");
        assert_eq!(ErrorCode::InternalError.kind().as_str(), "internal_server_error");
    }

    #[test]
    fn test_identity_survives_wrapping() {
        let error = ScribeError::role_not_found("editor").wrap("loading role for assignment");

        assert!(error.is(ErrorCode::RoleNotFound));
        assert_eq!(error.internal_message(), Some("loading role for assignment"));
        assert_eq!(error.user_message(), "Role not found: editor");
    }

    #[test]
    fn test_chain_walks_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let error = ScribeError::internal("store call failed").with_source(io);

        let chain = error.chain();
        assert!(chain.contains("store call failed"));
        assert!(chain.ends_with("socket closed"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_envelope_carries_business_code_and_context() {
        let error = ScribeError::role_name_exists("editor");
        let body = serde_json::to_value(ErrorResponse::from(&error)).unwrap();

        assert_eq!(body["error"], "conflict");
        assert_eq!(body["business_code"], "ROLE_NAME_EXISTS");
        assert_eq!(body["context"]["name"], "editor");
    }

    #[test]
    fn test_envelope_hides_internal_details() {
        let error = ScribeError::internal("password=hunter2").with_context("dsn", "postgres://...");
        let body = serde_json::to_value(ErrorResponse::from(&error)).unwrap();

        assert_eq!(body["error"], "internal_server_error");
        assert_eq!(body["message"], "An internal error occurred");
        assert!(body.get("context").is_none());
        assert!(body.get("business_code").is_none());
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let err = missing.with_error_code(ErrorCode::PermissionNotFound).unwrap_err();
        assert!(err.is(ErrorCode::PermissionNotFound));
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let err = ScribeError::from(sqlx::Error::RowNotFound);
        assert!(err.is(ErrorCode::ResourceNotFound));
    }

    #[test]
    fn test_from_anyhow_preserves_scribe_error() {
        let original = ScribeError::forbidden("nope");
        let err = ScribeError::from(anyhow::Error::new(original));
        assert!(err.is(ErrorCode::Forbidden));
    }

    #[test]
    fn test_error_display() {
        let error = ScribeError::with_internal(
            ErrorCode::DatabaseError,
            "A database error occurred",
            "connection refused",
        );

        let display = format!("{}", error);
        assert!(display.contains("DatabaseError"));
        assert!(display.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_into_response_renders_envelope() {
        let response = ScribeError::template_cannot_assign("content_manager_template").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["business_code"], "TEMPLATE_CANNOT_ASSIGN");
    }

    #[tokio::test]
    async fn test_canceled_has_no_body() {
        let response = ScribeError::canceled("client went away").into_response();
        assert_eq!(response.status().as_u16(), 499);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
}
