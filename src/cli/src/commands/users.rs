//! User binding commands: role assignment, direct permission grants and the
//! caller's own profile.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use super::RoleInfo;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create (or refresh) the profile of the token's subject
    Register,

    /// Show the caller's effective permissions and roles
    Whoami,

    /// Show a user profile
    Get {
        /// User ID
        user_id: Uuid,
    },

    /// List roles bound to a user
    Roles {
        /// User ID
        user_id: Uuid,
    },

    /// Bind a role to a user
    Assign {
        /// User ID
        user_id: Uuid,

        /// Role ID
        #[arg(short, long)]
        role: Uuid,
    },

    /// Replace every role bound to a user
    SetRoles {
        /// User ID
        user_id: Uuid,

        /// Role IDs (repeatable; none clears all roles)
        #[arg(short, long = "role")]
        roles: Vec<Uuid>,
    },

    /// Remove a role from a user
    Revoke {
        /// User ID
        user_id: Uuid,

        /// Role ID
        #[arg(short, long)]
        role: Uuid,
    },

    /// Grant a permission directly to a user
    Grant {
        /// User ID
        user_id: Uuid,

        /// Permission ID
        #[arg(short, long)]
        permission: Uuid,
    },

    /// Revoke a directly granted permission
    RevokePermission {
        /// User ID
        user_id: Uuid,

        /// Permission ID
        #[arg(short, long)]
        permission: Uuid,
    },
}

// ── API request / response types ────────────────────────────────────────────

#[derive(Serialize)]
struct AssignRoleRequest {
    role_id: Uuid,
}

#[derive(Serialize)]
struct ReplaceRolesRequest {
    role_ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct GrantPermissionRequest {
    permission_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
struct UserProfile {
    id: Uuid,
    external_id: String,
    email: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RoleGrant {
    role: RoleInfo,
    #[serde(default)]
    granted_by: Option<Uuid>,
    granted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
struct AuthorizationSummary {
    user_id: Uuid,
    permissions: Vec<String>,
    roles: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct GrantRow {
    #[tabled(rename = "Role ID")]
    id: String,
    #[tabled(rename = "Role")]
    name: String,
    #[tabled(rename = "Granted By")]
    granted_by: String,
    #[tabled(rename = "Granted At")]
    granted_at: String,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: UserCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        UserCommands::Register => {
            let profile: UserProfile = client
                .post("/api/v1/users/profile", &serde_json::json!({}))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Profile ready for {}", profile.email));
                    print_profile(&profile);
                }
                _ => output::print_item(&profile, format)?,
            }
        }

        UserCommands::Whoami => {
            let summary: AuthorizationSummary = client.get("/api/v1/me/authorization").await?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Caller");
                    output::print_detail("User ID", &summary.user_id.to_string());
                    output::print_detail("Roles", &summary.roles.join(", "));
                    output::print_header("Effective Permissions");
                    for permission in &summary.permissions {
                        println!("  {}", permission);
                    }
                }
                _ => output::print_item(&summary, format)?,
            }
        }

        UserCommands::Get { user_id } => {
            let profile: UserProfile = client.get(&format!("/api/v1/users/{}", user_id)).await?;
            match format {
                OutputFormat::Table => print_profile(&profile),
                _ => output::print_item(&profile, format)?,
            }
        }

        UserCommands::Roles { user_id } => {
            let grants: Vec<RoleGrant> = client
                .get(&format!("/api/v1/users/{}/roles", user_id))
                .await?;
            print_grants(&grants, format)?;
        }

        UserCommands::Assign { user_id, role } => {
            let grants: Vec<RoleGrant> = client
                .post(
                    &format!("/api/v1/users/{}/roles", user_id),
                    &AssignRoleRequest { role_id: role },
                )
                .await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Role {} assigned to {}", role, user_id));
            }
            print_grants(&grants, format)?;
        }

        UserCommands::SetRoles { user_id, roles } => {
            let grants: Vec<RoleGrant> = client
                .put(
                    &format!("/api/v1/users/{}/roles", user_id),
                    &ReplaceRolesRequest { role_ids: roles },
                )
                .await?;
            print_grants(&grants, format)?;
        }

        UserCommands::Revoke { user_id, role } => {
            client
                .delete(&format!("/api/v1/users/{}/roles/{}", user_id, role))
                .await?;
            output::print_success(&format!("Role {} removed from {}", role, user_id));
        }

        UserCommands::Grant {
            user_id,
            permission,
        } => {
            client
                .post_no_content(
                    &format!("/api/v1/users/{}/permissions", user_id),
                    &GrantPermissionRequest {
                        permission_id: permission,
                    },
                )
                .await?;
            output::print_success(&format!("Permission {} granted to {}", permission, user_id));
        }

        UserCommands::RevokePermission {
            user_id,
            permission,
        } => {
            client
                .delete(&format!(
                    "/api/v1/users/{}/permissions/{}",
                    user_id, permission
                ))
                .await?;
            output::print_success(&format!(
                "Permission {} revoked from {}",
                permission, user_id
            ));
        }
    }

    Ok(())
}

fn print_profile(profile: &UserProfile) {
    output::print_header("User");
    output::print_detail("ID", &profile.id.to_string());
    output::print_detail("External ID", &profile.external_id);
    output::print_detail("Email", &profile.email);
    if let Some(created) = &profile.created_at {
        output::print_detail("Created", &created.to_rfc3339());
    }
}

fn print_grants(grants: &[RoleGrant], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<GrantRow> = grants
                .iter()
                .map(|g| GrantRow {
                    id: output::short_id(&g.role.id),
                    name: g.role.name.clone(),
                    granted_by: g
                        .granted_by
                        .map(|id| output::short_id(&id))
                        .unwrap_or_else(|| "-".to_string()),
                    granted_at: g.granted_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            output::print_list(&rows, format)
        }
        _ => output::print_item(&grants, format),
    }
}
