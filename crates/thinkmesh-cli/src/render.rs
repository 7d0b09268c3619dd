//! # Terminal Rendering
//!
//! Utilities for rendering formatted output to the terminal.

use colored::Colorize;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

/// Output style
pub enum Style {
    Error,
    Warning,
    Info,
    Success,
}

/// Print a message with a style
pub fn print_styled(message: &str, style: Style) {
    let prefix = match style {
        Style::Error => "Error:".bright_red().bold(),
        Style::Warning => "Warning:".bright_yellow().bold(),
        Style::Info => "Info:".bright_cyan().bold(),
        Style::Success => "✓".bright_green().bold(),
    };
    println!("{} {}", prefix, message);
}

pub fn print_heading(title: &str) {
    println!("{}", title.bright_cyan().bold());
    println!();
}

/// Print a `key: value` line with an aligned key
pub fn print_field(key: &str, value: impl std::fmt::Display) {
    println!("  {:<24} {}", format!("{}:", key).dimmed(), value);
}

/// Confidence in [0, 1], coloured by strength
pub fn confidence(value: f64) -> String {
    let text = format!("{:.3}", value);
    if value >= 0.8 {
        text.bright_green().to_string()
    } else if value >= 0.5 {
        text.bright_yellow().to_string()
    } else {
        text.bright_red().to_string()
    }
}

pub fn outcome(success: bool) -> String {
    if success {
        "success".bright_green().bold().to_string()
    } else {
        "failed".bright_red().bold().to_string()
    }
}

/// Pretty JSON to stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a simple table
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.width());
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| pad(h, widths[i]))
        .collect();
    println!("{}", header_line.join(" │ ").bright_cyan().bold());

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", separator.join("─┼─").dimmed());

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths.get(i).copied().unwrap_or(0)))
            .collect();
        println!("{}", row_line.join(" │ "));
    }
}

fn pad(text: &str, width: usize) -> String {
    format!("{}{}", text, " ".repeat(width.saturating_sub(text.width())))
}
