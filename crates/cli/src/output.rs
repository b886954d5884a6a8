//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::models::RiskBand;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section header
pub fn print_header(title: &str, width: usize) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(width));
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
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability as percentage
pub fn format_probability(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

/// Format a metric in [0, 1] with three decimals
pub fn format_metric(value: f64) -> String {
    format!("{:.3}", value)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Color a risk band with its traffic-light colour
pub fn color_band(band: RiskBand) -> String {
    let text = format!("{} ({})", band, band.colour());
    match band {
        RiskBand::Low => text.green().to_string(),
        RiskBand::Medium => text.yellow().to_string(),
        RiskBand::High => text.red().bold().to_string(),
    }
}

/// Color a signed metric change
pub fn color_delta(delta: f64) -> String {
    let formatted = format!("{:+.3}", delta);
    if delta > 0.0 {
        formatted.green().to_string()
    } else if delta < 0.0 {
        formatted.red().to_string()
    } else {
        formatted
    }
}

/// Color a lifecycle branch label
pub fn color_branch(branch: &str) -> String {
    match branch {
        "promoted" | "candidate" => branch.green().to_string(),
        "retained" | "incumbent" | "skipped" => branch.yellow().to_string(),
        "retrain_failed" => branch.red().to_string(),
        _ => branch.to_string(),
    }
}
