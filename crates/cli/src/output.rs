//! Terminal output helpers.
//!
//! Status lines go through these so colors are dropped when the stream is not
//! a terminal.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
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
  pub const SKIPPED: &str = "-";
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

#[derive(Clone, Copy)]
enum Tone {
  Green,
  Red,
  Yellow,
  Dim,
}

/// `symbol message` on stdout, or on stderr for errors and warnings. Only the
/// symbol is colored for successes; the whole line otherwise.
fn status_line(symbol: &str, tone: Tone, message: &str) {
  let to_stderr = matches!(tone, Tone::Red | Tone::Yellow);
  let paint = |text: &str| -> String {
    let stream = if to_stderr { Stream::Stderr } else { Stream::Stdout };
    match tone {
      Tone::Green => text.if_supports_color(stream, |s| s.green()).to_string(),
      Tone::Red => text.if_supports_color(stream, |s| s.red()).to_string(),
      Tone::Yellow => text.if_supports_color(stream, |s| s.yellow()).to_string(),
      Tone::Dim => text.if_supports_color(stream, |s| s.dimmed()).to_string(),
    }
  };
  let body = match tone {
    Tone::Green => message.to_string(),
    _ => paint(message),
  };
  let line = format!("{} {}", paint(symbol), body);
  if to_stderr {
    eprintln!("{}", line);
  } else {
    println!("{}", line);
  }
}

pub fn print_success(message: &str) {
  status_line(symbols::SUCCESS, Tone::Green, message);
}

pub fn print_error(message: &str) {
  status_line(symbols::ERROR, Tone::Red, message);
}

pub fn print_warning(message: &str) {
  status_line(symbols::WARNING, Tone::Yellow, message);
}

/// A target that was not attempted.
pub fn print_skipped(message: &str) {
  status_line(symbols::SKIPPED, Tone::Dim, message);
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
