//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a [0, 1] level as a percentage
pub fn format_level(level: f64) -> String {
    format!("{:.0}%", level * 100.0)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    color_as(status, status)
}

/// Color `text` the way `status` would be colored
pub fn color_as(text: &str, status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ok" | "mission_success" | "completed" => text.green().to_string(),
        "degraded" | "warning" | "idle" => text.yellow().to_string(),
        "unhealthy" | "error" | "failed" => text.red().to_string(),
        s if s.ends_with("_failure") => text.red().to_string(),
        _ => text.to_string(),
    }
}

/// Color a soiling level against the attention threshold
pub fn color_level(level: f64, threshold: f64) -> String {
    let formatted = format_level(level);
    if level > threshold {
        formatted.red().to_string()
    } else if level > threshold * 0.8 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(0.0), "0%");
        assert_eq!(format_level(0.756), "76%");
        assert_eq!(format_level(1.0), "100%");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("takeoff_failure"), "takeoff_failure");
        assert_eq!(color_status("healthy"), "healthy");
    }
}
