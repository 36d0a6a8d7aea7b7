use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

use crate::cache::FetchStatus;
use crate::view::SortDirection;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for the grid's fetch status
pub fn status_color(status: FetchStatus) -> Color {
  match status {
    FetchStatus::Success => Color::Green,
    FetchStatus::Loading => Color::Yellow,
    FetchStatus::Error => Color::Red,
    FetchStatus::Idle => Color::DarkGray,
  }
}

pub fn sort_arrow(direction: SortDirection) -> &'static str {
  match direction {
    SortDirection::Asc => "▲",
    SortDirection::Desc => "▼",
  }
}

/// "just now", "42s ago", "5m ago", "3h ago"
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - then).num_seconds().max(0);
  match secs {
    0..=4 => "just now".to_string(),
    5..=59 => format!("{}s ago", secs),
    60..=3599 => format!("{}m ago", secs / 60),
    _ => format!("{}h ago", secs / 3600),
  }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.format("%Y-%m-%d %H:%M").to_string()
}
