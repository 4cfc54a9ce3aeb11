//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, ScribeError};

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Token validation
    pub auth: AuthSettings,

    /// Decision engine and seeding
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Ownership sources registered at startup
    #[serde(default)]
    pub ownership: OwnershipConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Apply embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// JWKS endpoint of the identity provider
    pub jwks_url: String,

    /// Required `iss` claim
    pub issuer: String,

    /// Required `aud` claim, if any
    pub audience: Option<String>,

    /// Accepted signing algorithms
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,

    /// Seconds between JWKS refreshes; must be positive
    #[serde(default = "default_jwks_refresh_secs")]
    pub jwks_refresh_secs: u64,

    /// Clock skew tolerance in seconds
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,

    /// Token claim carrying the internal user id. When unset, the subject
    /// is looked up in the user directory.
    #[serde(default)]
    pub user_id_claim: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// Upper bound for a single store or ownership call made by the decision engine
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,

    /// Reconcile the permission catalog and default roles on startup
    #[serde(default = "default_true")]
    pub seed_on_startup: bool,
}

impl AuthzConfig {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            decision_timeout_ms: default_decision_timeout_ms(),
            seed_on_startup: true,
        }
    }
}

/// Ownership sources are opt-in. The authorization schema does not create the
/// content tables, so each deployment names the ones it has, e.g.
///
/// ```toml
/// [[ownership.sources]]
/// resource_type = "posts"
/// table = "posts"
/// owner_column = "author_id"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnershipConfig {
    #[serde(default)]
    pub sources: Vec<OwnershipSource>,
}

/// A table that records which user owns each row of a resource type.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OwnershipSource {
    pub resource_type: String,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub owner_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_true")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            json_logging: true,
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout_secs() -> u64 { 5 }
fn default_true() -> bool { true }
fn default_algorithms() -> Vec<String> { vec!["RS256".to_string()] }
fn default_jwks_refresh_secs() -> u64 { 300 }
fn default_leeway_secs() -> u64 { 30 }
fn default_decision_timeout_ms() -> u64 { 2000 }
fn default_id_column() -> String { "id".to_string() }
fn default_log_level() -> String { "info".to_string() }

const ENV_PREFIX: &str = "SCRIBE";

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.algorithms.is_empty() {
            return Err(ScribeError::configuration(
                "auth.algorithms must name at least one algorithm",
            ));
        }
        if self.authz.decision_timeout_ms == 0 {
            return Err(ScribeError::configuration(
                "authz.decision_timeout_ms must be positive",
            ));
        }
        if self.auth.jwks_refresh_secs == 0 {
            return Err(ScribeError::configuration(
                "auth.jwks_refresh_secs must be positive",
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ScribeError::configuration(
                "database.min_connections exceeds database.max_connections",
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
