//! Console output helpers
//!
//! Glyph-prefixed one-liners for the interactive commands. The unattended
//! `update` path writes to the run log instead; these only ever speak to a
//! human at a terminal, so everything goes straight to stdout (errors to
//! stderr) with no buffering or levels.

use colored::Colorize;

pub fn info(msg: &str) {
    println!("{} {msg}", "ℹ".blue());
}

pub fn success(msg: &str) {
    println!("{} {msg}", "✓".green());
}

pub fn warn(msg: &str) {
    println!("{} {msg}", "⚠".yellow());
}

pub fn error(msg: &str) {
    eprintln!("{} {msg}", "✗".red());
}

/// Muted detail line under a preceding message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Underlined title opening a command's output
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Indented `key: value` line under a section
pub fn kv(key: &str, value: &str) {
    println!("  {}: {value}", key.dimmed());
}

/// `[n/total]` progress prefix for plan previews
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {msg}", format!("[{num}/{total}]").blue().bold());
}
