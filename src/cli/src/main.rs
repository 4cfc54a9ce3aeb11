//! Scribe CLI - operator tool for Scribe roles, permissions and user bindings.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, health, permissions, roles, users};
use output::OutputFormat;

/// Scribe - authorization administration CLI
#[derive(Parser)]
#[command(
    name = "scribe",
    version,
    about = "Scribe - authorization administration",
    long_about = "CLI tool for managing Scribe roles, permissions and user role bindings.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "SCRIBE_API_URL")]
    api_url: Option<String>,

    /// Bearer token sent with every admin request
    #[arg(long, global = true, env = "SCRIBE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Permission catalog
    #[command(subcommand)]
    Permissions(permissions::PermissionCommands),

    /// Role management
    #[command(subcommand)]
    Roles(roles::RoleCommands),

    /// User role bindings and direct grants
    #[command(subcommand)]
    Users(users::UserCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let stored = config::stored();
    let api_url = cli
        .api_url
        .clone()
        .or(stored.api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let token = cli.token.clone().or(stored.token);

    let client = client::ApiClient::new(&api_url, token)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Permissions(cmd) => permissions::execute(cmd, &client, format).await,
        Commands::Roles(cmd) => roles::execute(cmd, &client, format).await,
        Commands::Users(cmd) => users::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_role_create() {
        let cli = Cli::try_parse_from([
            "scribe",
            "-o",
            "json",
            "roles",
            "create",
            "--name",
            "Reviewer",
            "-p",
            "7f1c1f5e-4d1e-4a53-9c39-0d8f7c4f4e10",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Roles(roles::RoleCommands::Create { .. })));
    }

    #[test]
    fn test_config_keys_are_checked() {
        let cli = Cli::try_parse_from(["scribe", "config", "set", "api-url", "http://scribe:8080"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(config::ConfigCommands::Set {
                key: config::Key::ApiUrl,
                ..
            })
        ));

        assert!(Cli::try_parse_from(["scribe", "config", "set", "colour", "red"]).is_err());
    }
}
