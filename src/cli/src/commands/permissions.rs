//! Permission catalog listing.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use super::PermissionInfo;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum PermissionCommands {
    /// List every registered permission
    List {
        /// Only show permissions for this resource
        #[arg(short, long)]
        resource: Option<String>,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Permission")]
    permission: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub async fn execute(
    cmd: PermissionCommands,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        PermissionCommands::List { resource } => {
            let mut permissions: Vec<PermissionInfo> = client.get("/api/v1/permissions").await?;
            if let Some(resource) = &resource {
                permissions.retain(|p| &p.resource == resource);
            }

            match format {
                OutputFormat::Table => {
                    let rows: Vec<PermissionRow> = permissions
                        .iter()
                        .map(|p| PermissionRow {
                            id: output::short_id(&p.id),
                            permission: p.canonical(),
                            description: p.description.clone(),
                        })
                        .collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&permissions, format)?,
            }
        }
    }

    Ok(())
}
