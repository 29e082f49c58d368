//! Terminal output for the gocross CLI.
//!
//! The build report goes to stdout. Status and diagnostics go to stderr, so
//! `--output json` leaves stdout as a single JSON document.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
}

/// Size column in the style of `ls -h`: rounded up, one decimal below 10.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["K", "M", "G", "T"];

  if bytes < 1024 {
    return bytes.to_string();
  }

  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }

  let tenths = (value * 10.0).ceil() / 10.0;
  if tenths < 10.0 {
    format!("{:.1}{}", tenths, UNITS[unit])
  } else {
    format!("{}{}", value.ceil() as u64, UNITS[unit])
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// `--- TITLE ---` separator line on stdout.
pub fn print_section(title: &str) {
  println!("--- {} ---", title);
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprint_status(symbols::ERROR, AnsiColors::Red, message);
}

pub fn print_warning(message: &str) {
  eprint_status(symbols::WARNING, AnsiColors::Yellow, message);
}

fn eprint_status(symbol: &str, color: AnsiColors, message: &str) {
  eprintln!(
    "{} {}",
    symbol.if_supports_color(Stream::Stderr, |s| s.color(color)),
    message.if_supports_color(Stream::Stderr, |s| s.color(color))
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
