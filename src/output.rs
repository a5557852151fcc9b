//! Rendering of command results as table, JSON, YAML, or a quiet token.

use std::fmt::Display;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
    Quiet,
}

/// A command result that can be shown to a human or a script.
pub trait Report: Serialize {
    /// Human rendering, newline-terminated.
    fn table(&self) -> String;

    /// Minimal token for `--output quiet`, if any.
    fn quiet(&self) -> Option<String> {
        None
    }
}

impl<T: Report> Report for Vec<T> {
    fn table(&self) -> String {
        self.iter().map(Report::table).collect()
    }

    fn quiet(&self) -> Option<String> {
        let lines: Vec<String> = self.iter().filter_map(Report::quiet).collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

pub fn render<R: Report + ?Sized>(report: &R, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => report.table(),
        OutputFormat::Json => {
            let mut text =
                serde_json::to_string_pretty(report).context("failed to serialize result to JSON")?;
            text.push('\n');
            text
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).context("failed to serialize result to YAML")?
        }
        OutputFormat::Quiet => report
            .quiet()
            .map(|token| format!("{token}\n"))
            .unwrap_or_default(),
    })
}

pub fn emit<R: Report + ?Sized>(report: &R, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    let text = render(report, format)?;
    out.write_all(text.as_bytes())
        .and_then(|_| out.flush())
        .context("failed to write output")
}

/// Streaming writer for `follow`: one JSON object per line, one YAML document
/// per event, or the raw line.
pub struct EventWriter<'a> {
    format: OutputFormat,
    out: &'a mut dyn Write,
}

impl<'a> EventWriter<'a> {
    pub fn new(format: OutputFormat, out: &'a mut dyn Write) -> Self {
        Self { format, out }
    }

    pub fn write<E: Serialize>(&mut self, event: &E, line: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *self.out, event).context("failed to serialize event")?;
                self.out.write_all(b"\n")?;
            }
            OutputFormat::Yaml => {
                let doc = serde_yaml::to_string(event).context("failed to serialize event")?;
                self.out.write_all(b"---\n")?;
                self.out.write_all(doc.as_bytes())?;
            }
            OutputFormat::Table | OutputFormat::Quiet => {
                writeln!(self.out, "{line}")?;
            }
        }
        self.out.flush().context("failed to write output")
    }
}

/// `  key                  value` line, as used by key/value tables.
pub fn push_kv(output: &mut String, key: &str, value: impl Display) {
    output.push_str(&format!("  {key:<20} {value}\n"));
}

pub fn active_label(active: bool) -> &'static str {
    if active { "active" } else { "inactive" }
}

/// "12s ago", "3m ago", "2h ago", "4d ago", or "-" when unknown.
pub fn format_relative(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "-".to_string();
    };
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..60 => format!("{secs}s ago"),
        60..3600 => format!("{}m ago", secs / 60),
        3600..86400 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}
