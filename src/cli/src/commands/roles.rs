//! Role management commands.
//!
//! Covers custom roles, template cloning and role permission sets. System
//! roles are rejected by the server for update and delete.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use super::RoleInfo;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum RoleCommands {
    /// List all roles
    List,

    /// List role templates
    Templates,

    /// Show a role and its permissions
    Get {
        /// Role ID
        role_id: Uuid,
    },

    /// Create a custom role
    Create {
        /// Role name
        #[arg(short, long)]
        name: String,

        /// Role description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Mark the role as a template
        #[arg(long)]
        template: bool,

        /// Permission IDs to attach (repeatable)
        #[arg(short, long = "permission")]
        permissions: Vec<Uuid>,
    },

    /// Create a role by copying a template's permissions
    Clone {
        /// Template role ID
        template_id: Uuid,

        /// Name of the new role
        #[arg(short, long)]
        name: String,

        /// Description of the new role
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Rename a role or change its description
    Update {
        /// Role ID
        role_id: Uuid,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Replace a role's permission set
    SetPermissions {
        /// Role ID
        role_id: Uuid,

        /// Permission IDs (repeatable; none clears the set)
        #[arg(short, long = "permission")]
        permissions: Vec<Uuid>,
    },

    /// Delete a custom role
    Delete {
        /// Role ID
        role_id: Uuid,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

// ── API request types ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateRoleRequest {
    name: String,
    description: String,
    is_template: bool,
    permission_ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct CloneTemplateRequest {
    template_id: Uuid,
    name: String,
    description: String,
}

#[derive(Serialize)]
struct UpdateRoleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize)]
struct RolePermissionsRequest {
    permission_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Permissions")]
    permissions: usize,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&RoleInfo> for RoleRow {
    fn from(role: &RoleInfo) -> Self {
        let kind = match (role.is_system, role.is_template) {
            (true, true) => "system template",
            (true, false) => "system",
            (false, true) => "template",
            (false, false) => "custom",
        };
        Self {
            id: output::short_id(&role.id),
            name: role.name.clone(),
            kind: kind.to_string(),
            permissions: role.permissions.len(),
            description: role.description.clone(),
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: RoleCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        RoleCommands::List => {
            let roles: Vec<RoleInfo> = client.get("/api/v1/roles").await?;
            print_roles(&roles, format)?;
        }

        RoleCommands::Templates => {
            let roles: Vec<RoleInfo> = client.get("/api/v1/roles/templates").await?;
            print_roles(&roles, format)?;
        }

        RoleCommands::Get { role_id } => {
            let role: RoleInfo = client.get(&format!("/api/v1/roles/{}", role_id)).await?;
            print_role(&role, format)?;
        }

        RoleCommands::Create {
            name,
            description,
            template,
            permissions,
        } => {
            let req = CreateRoleRequest {
                name,
                description,
                is_template: template,
                permission_ids: permissions,
            };
            let role: RoleInfo = client.post("/api/v1/roles", &req).await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Role '{}' created ({})", role.name, role.id));
            }
            print_role(&role, format)?;
        }

        RoleCommands::Clone {
            template_id,
            name,
            description,
        } => {
            let req = CloneTemplateRequest {
                template_id,
                name,
                description,
            };
            let role: RoleInfo = client.post("/api/v1/roles/from-template", &req).await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Role '{}' created ({})", role.name, role.id));
            }
            print_role(&role, format)?;
        }

        RoleCommands::Update {
            role_id,
            name,
            description,
        } => {
            if name.is_none() && description.is_none() {
                output::print_info("Nothing to update. Pass --name and/or --description.");
                return Ok(());
            }
            let req = UpdateRoleRequest { name, description };
            let role: RoleInfo = client
                .put(&format!("/api/v1/roles/{}", role_id), &req)
                .await?;
            print_role(&role, format)?;
        }

        RoleCommands::SetPermissions {
            role_id,
            permissions,
        } => {
            let req = RolePermissionsRequest {
                permission_ids: permissions,
            };
            let role: RoleInfo = client
                .put(&format!("/api/v1/roles/{}/permissions", role_id), &req)
                .await?;
            print_role(&role, format)?;
        }

        RoleCommands::Delete { role_id, force } => {
            if !force {
                output::print_info("This will delete the role. Use --force to confirm.");
                return Ok(());
            }

            client.delete(&format!("/api/v1/roles/{}", role_id)).await?;

            match format {
                OutputFormat::Table => output::print_success(&format!("Role {} deleted", role_id)),
                _ => output::print_item(
                    &serde_json::json!({ "id": role_id, "status": "deleted" }),
                    format,
                )?,
            }
        }
    }

    Ok(())
}

fn print_roles(roles: &[RoleInfo], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<RoleRow> = roles.iter().map(RoleRow::from).collect();
            output::print_list(&rows, format)
        }
        _ => output::print_item(&roles, format),
    }
}

fn print_role(role: &RoleInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Role: {}", role.name));
            output::print_detail("ID", &role.id.to_string());
            output::print_detail("Description", &role.description);
            output::print_detail("Template", &role.is_template.to_string());
            output::print_detail("System", &role.is_system.to_string());
            output::print_header("Permissions");
            if role.permissions.is_empty() {
                output::print_info("No permissions attached.");
            }
            for permission in &role.permissions {
                output::print_detail(&permission.canonical(), &permission.id.to_string());
            }
            Ok(())
        }
        _ => output::print_item(role, format),
    }
}
