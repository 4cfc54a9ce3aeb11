pub mod config;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Shared response types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct PermissionInfo {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl PermissionInfo {
    pub fn canonical(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}:{}:{}", self.resource, self.action, scope),
            None => format!("{}:{}", self.resource, self.action),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RoleInfo {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub permissions: Vec<PermissionInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_permission_id() {
        let mut permission: PermissionInfo = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "permission": "posts:update:own",
            "resource": "posts",
            "action": "update",
            "scope": "own",
            "description": "Update own posts",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(permission.canonical(), "posts:update:own");

        permission.scope = None;
        assert_eq!(permission.canonical(), "posts:update");
    }
}
