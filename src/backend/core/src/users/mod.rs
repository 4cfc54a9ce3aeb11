//! User directory: maps identity-provider subjects to internal user ids.
//!
//! Profiles are created on first sign-in and looked up on every request by
//! the identity layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Result, ScribeError};
use crate::rbac::models::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub external_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserProfile>>;

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>>;

    /// Create the profile for `external_id`, or return the existing one with
    /// its email refreshed.
    async fn create_profile(&self, external_id: &str, email: &str) -> Result<UserProfile>;
}

fn validate(external_id: &str, email: &str) -> Result<()> {
    if external_id.trim().is_empty() {
        return Err(ScribeError::validation("External id must not be empty"));
    }
    if email.trim().is_empty() {
        return Err(ScribeError::validation("Email must not be empty"));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PostgreSQL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    external_id: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            external_id: row.external_id,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_id, email, created_at, updated_at FROM users WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile.map(UserProfile::from))
    }

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_id, email, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile.map(UserProfile::from))
    }

    async fn create_profile(&self, external_id: &str, email: &str) -> Result<UserProfile> {
        validate(external_id, email)?;
        let profile = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, external_id, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id)
            DO UPDATE SET email = EXCLUDED.email, updated_at = NOW()
            RETURNING id, external_id, email, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(external_id.trim())
        .bind(email.trim())
        .fetch_one(&self.pool)
        .await?;
        Ok(profile.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().get(external_id).cloned())
    }

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().values().find(|p| p.id == id).cloned())
    }

    async fn create_profile(&self, external_id: &str, email: &str) -> Result<UserProfile> {
        validate(external_id, email)?;
        let now = Utc::now();
        let mut profiles = self.profiles.write();
        let profile = profiles
            .entry(external_id.trim().to_string())
            .and_modify(|p| {
                p.email = email.trim().to_string();
                p.updated_at = now;
            })
            .or_insert_with(|| UserProfile {
                id: UserId::new(),
                external_id: external_id.trim().to_string(),
                email: email.trim().to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(profile.clone())
    }
}
