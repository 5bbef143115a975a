// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use once_cell::sync::Lazy;

use crate::catalog::{BatchReport, SearchResult};

static COLORS_ENABLED: Lazy<bool> = Lazy::new(|| std::env::var("NO_COLOR").is_err());

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    *COLORS_ENABLED
}

/// Colorize item name (bold)
pub fn colorize_name(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize category (green)
pub fn colorize_category(text: &str, use_color: bool) -> String {
    if use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize item key (cyan)
pub fn colorize_key(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize match score (yellow)
pub fn colorize_score(text: &str, use_color: bool) -> String {
    if use_color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize secondary detail (dimmed)
pub fn colorize_detail(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Format an optional price for display
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(price) => format!("${:.2}", price),
        None => "-".to_string(),
    }
}

/// Format one search result as a terminal line
pub fn format_result_line(result: &SearchResult, use_color: bool) -> String {
    let score = format!("{:.1}%", result.similarity_score * 100.0);
    let mut line = format!(
        "{:>3}. {}  {}  {}  {}  {}",
        result.rank,
        colorize_name(&result.item.name, use_color),
        colorize_score(&score, use_color),
        colorize_category(&result.item.category, use_color),
        format_price(result.item.price),
        colorize_key(&result.item_key, use_color),
    );
    if !result.item.description.is_empty() {
        line.push('\n');
        line.push_str("     ");
        line.push_str(&colorize_detail(&result.item.description, use_color));
    }
    line
}

/// Format a batch report summary as terminal lines
pub fn format_report(report: &BatchReport, use_color: bool) -> String {
    let mut lines = vec![format!(
        "Ingested {} of {} records",
        report.succeeded.len(),
        report.total()
    )];
    for failure in &report.failed {
        lines.push(format!(
            "  {} record {} ('{}'): {}",
            colorize_detail("failed", use_color),
            failure.index,
            failure.name,
            failure.reason
        ));
    }
    lines.join("\n")
}
