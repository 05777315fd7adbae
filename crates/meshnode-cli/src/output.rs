//! Output helpers for CLI commands.
//!
//! Every command result is a record that renders either as aligned
//! `key: value` text or as JSON.

use std::fmt;

use serde::Serialize;

/// Renders `record` as text or pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render<T: Serialize + fmt::Display>(record: &T, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(record)?)
    } else {
        Ok(record.to_string())
    }
}

/// Prints `record` to stdout.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
#[allow(clippy::print_stdout)]
pub fn print_record<T: Serialize + fmt::Display>(record: &T, json: bool) -> anyhow::Result<()> {
    println!("{}", render(record, json)?.trim_end());
    Ok(())
}

/// Writes one `key: value` line padded to a common key width.
///
/// # Errors
///
/// Returns the formatter's error.
pub fn field(f: &mut fmt::Formatter<'_>, key: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "{:<12} {value}", format!("{key}:"))
}
