//! `scribe config`: connection settings kept in `~/.scribe/config.toml`.
//!
//! `--api-url`/`--token` and their environment variables take precedence over
//! anything stored here.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::{self, OutputFormat};

/// A stored setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Key {
    /// Base URL of the Scribe server
    ApiUrl,
    /// Bearer token for the admin API
    Token,
}

impl Key {
    fn name(self) -> &'static str {
        match self {
            Self::ApiUrl => "api-url",
            Self::Token => "token",
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Store a setting
    Set {
        key: Key,
        value: String,
    },

    /// Print a stored setting
    Get {
        key: Key,
    },

    /// Remove a stored setting
    Unset {
        key: Key,
    },

    /// Show every stored setting (the token is masked)
    Show,

    /// Print the location of the settings file
    Path,

    /// Delete the settings file
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Settings {
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".scribe").join("config.toml"))
    }

    /// A missing file reads as empty settings.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to encode settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn get(&self, key: Key) -> Option<&str> {
        match key {
            Key::ApiUrl => self.api_url.as_deref(),
            Key::Token => self.token.as_deref(),
        }
    }

    fn slot(&mut self, key: Key) -> &mut Option<String> {
        match key {
            Key::ApiUrl => &mut self.api_url,
            Key::Token => &mut self.token,
        }
    }

    fn is_empty(&self) -> bool {
        self.api_url.is_none() && self.token.is_none()
    }

    fn masked(&self) -> Self {
        Self {
            api_url: self.api_url.clone(),
            token: self.token.as_deref().map(mask),
        }
    }
}

/// Settings from the default location. Unreadable files count as empty so a
/// broken config never blocks flag- or env-driven use.
pub fn stored() -> Settings {
    Settings::default_path()
        .and_then(|path| Settings::load_from(&path))
        .unwrap_or_default()
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("****{}", tail)
}

fn shown(key: Key, value: &str) -> String {
    match key {
        Key::Token => mask(value),
        Key::ApiUrl => value.to_string(),
    }
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    let path = Settings::default_path()?;

    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut settings = Settings::load_from(&path)?;
            let display = shown(key, &value);
            *settings.slot(key) = Some(value);
            settings.save_to(&path)?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("{} set to {}", key.name(), display))
                }
                _ => output::print_item(
                    &serde_json::json!({ "key": key.name(), "value": display }),
                    format,
                )?,
            }
        }

        ConfigCommands::Get { key } => {
            let settings = Settings::load_from(&path)?;
            let value = settings
                .get(key)
                .with_context(|| format!("{} is not set", key.name()))?;
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(
                    &serde_json::json!({ "key": key.name(), "value": value }),
                    format,
                )?,
            }
        }

        ConfigCommands::Unset { key } => {
            let mut settings = Settings::load_from(&path)?;
            if settings.slot(key).take().is_none() {
                output::print_info(&format!("{} was not set", key.name()));
                return Ok(());
            }
            settings.save_to(&path)?;
            output::print_success(&format!("{} removed", key.name()));
        }

        ConfigCommands::Show => {
            let settings = Settings::load_from(&path)?.masked();
            match format {
                OutputFormat::Table if settings.is_empty() => {
                    output::print_info(&format!("No settings stored in {}", path.display()));
                }
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for key in [Key::ApiUrl, Key::Token] {
                        if let Some(value) = settings.get(key) {
                            output::print_detail(key.name(), value);
                        }
                    }
                }
                _ => output::print_item(&settings, format)?,
            }
        }

        ConfigCommands::Path => println!("{}", path.display()),

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This deletes every stored setting. Use --force to confirm.");
                return Ok(());
            }
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            output::print_success("Settings removed");
        }
    }

    Ok(())
}
