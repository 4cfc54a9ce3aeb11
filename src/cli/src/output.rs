//! Rendering of command results: tables and notices for people, JSON or YAML
//! for scripts.

use anyhow::Result;
use clap::ValueEnum;
use colored::{Color, Colorize};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Machine encoding of `value`, or `None` for table output.
    fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Option<String>> {
        Ok(match self {
            Self::Table => None,
            Self::Json => Some(format!("{}\n", serde_json::to_string_pretty(value)?)),
            Self::Yaml => Some(serde_yaml::to_string(value)?),
        })
    }
}

fn notice(tag: &str, color: Color, msg: &str) -> String {
    format!("{} {}", tag.color(color).bold(), msg)
}

pub fn print_success(msg: &str) {
    println!("{}", notice("ok", Color::Green, msg));
}

pub fn print_info(msg: &str) {
    println!("{}", notice("note", Color::Blue, msg));
}

pub fn print_error(msg: &str) {
    eprintln!("{}", notice("error:", Color::Red, msg));
}

/// Rows as a table, or the whole slice encoded for JSON/YAML.
pub fn print_list<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) -> Result<()> {
    if let Some(text) = format.encode(rows)? {
        print!("{}", text);
        return Ok(());
    }
    if rows.is_empty() {
        println!("{}", "(none)".dimmed());
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{}", table);
    Ok(())
}

/// Values with no table view of their own print as JSON in table mode.
pub fn print_item<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> Result<()> {
    let format = match format {
        OutputFormat::Table => OutputFormat::Json,
        other => other,
    };
    if let Some(text) = format.encode(item)? {
        print!("{}", text);
    }
    Ok(())
}

pub fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn print_detail(key: &str, value: &str) {
    println!("  {} {}", format!("{:<14}", key).as_str().cyan(), value);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "-".repeat(title.chars().count()).as_str().dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_machine_encoding() {
        assert_eq!(OutputFormat::Table.encode(&[1, 2]).unwrap(), None);
    }

    #[test]
    fn test_machine_encodings() {
        let value = serde_json::json!({ "name": "editor" });
        let json = OutputFormat::Json.encode(&value).unwrap().unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&json).unwrap(), value);

        let yaml = OutputFormat::Yaml.encode(&value).unwrap().unwrap();
        assert_eq!(yaml.trim(), "name: editor");
    }

    #[test]
    fn test_short_id() {
        let id = uuid::Uuid::nil();
        assert_eq!(short_id(&id), "00000000");
    }
}
