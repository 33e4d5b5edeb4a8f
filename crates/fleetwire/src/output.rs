//! Output formatting: plain text or JSON.
//!
//! One-shot results render as a single document; streaming commands emit
//! one line per change or notification.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::{Value, json};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Renderers ────────────────────────────────────────────────────────

/// Render a JSON document in the chosen format. Plain falls back to
/// compact JSON for structured data.
pub fn render_json(format: OutputFormat, data: &Value) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).unwrap_or_default(),
        OutputFormat::Plain | OutputFormat::JsonCompact => data.to_string(),
    }
}

/// Snapshot result of `count`.
pub fn render_count(format: OutputFormat, count: usize, items: Option<&[Value]>) -> String {
    match format {
        OutputFormat::Plain => {
            let mut out = count.to_string();
            for item in items.unwrap_or_default() {
                out.push('\n');
                out.push_str(&item.to_string());
            }
            out
        }
        _ => {
            let mut doc = json!({ "count": count });
            if let (Some(items), Some(obj)) = (items, doc.as_object_mut()) {
                obj.insert("items".into(), Value::Array(items.to_vec()));
            }
            render_json(format, &doc)
        }
    }
}

/// One `count --follow` change line.
pub fn render_change(format: OutputFormat, new: usize, old: usize, color: bool) -> String {
    match format {
        OutputFormat::Plain => {
            let delta = if new >= old {
                format!("+{}", new - old)
            } else {
                format!("-{}", old - new)
            };
            if !color {
                return format!("{new} ({delta})");
            }
            if new >= old {
                format!("{new} ({})", delta.green())
            } else {
                format!("{new} ({})", delta.red())
            }
        }
        // Streams stay line-oriented even for `json`.
        _ => json!({ "count": new, "previous": old }).to_string(),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}
