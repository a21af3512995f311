//! CLI output formatting utilities.
//!
//! Colored status lines, build-state coloring and JSON output.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use pkgrepo_lib::types::{BuildState, PackageId};

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
  pub const INFO: &str = "•";
}

/// Comma-separated ids, or `none`.
pub fn format_ids<'a>(ids: impl IntoIterator<Item = &'a PackageId>) -> String {
  let ids: Vec<String> = ids.into_iter().map(ToString::to_string).collect();
  if ids.is_empty() {
    return "none".to_string();
  }
  ids.join(", ")
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

pub fn format_state(state: BuildState) -> String {
  let label = state.as_str();
  match state {
    BuildState::Succeeded => label.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    BuildState::Failed => label.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    BuildState::Queued | BuildState::Building => label.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    BuildState::Unbuilt => label.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
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
