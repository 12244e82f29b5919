//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
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

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a score with two decimals
pub fn format_score(score: f64) -> String {
    format!("{:.2}", score)
}

/// Format a probability as percentage
pub fn format_probability(probability: f64) -> String {
    format!("{:.0}%", probability * 100.0)
}

/// Color a severity band label
pub fn color_band(band: &str) -> String {
    match band {
        "Safe" | "Low" => band.green().to_string(),
        "Moderate" => band.yellow().to_string(),
        "Considerable" | "High" => band.truecolor(255, 140, 0).to_string(),
        "Critical" | "Very High" => band.red().bold().to_string(),
        "No data" => band.dimmed().to_string(),
        _ => band.to_string(),
    }
}

/// Color job status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "processing" => status.yellow().to_string(),
        "completed" | "compliant" => status.green().to_string(),
        "failed" | "non-compliant" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Shorten a UUID for table display
pub fn truncate_id(id: &str) -> String {
    if id.chars().count() > 8 {
        format!("{}…", id.chars().take(8).collect::<String>())
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_score(123.456), "123.46");
        assert_eq!(format_probability(0.875), "88%");
        assert_eq!(truncate_id("0123456789abcdef"), "01234567…");
        assert_eq!(truncate_id("short"), "short");
    }

    #[test]
    fn test_color_keeps_label_text() {
        colored::control::set_override(false);
        assert_eq!(color_band("Very High"), "Very High");
        assert_eq!(color_status("completed"), "completed");
    }
}
