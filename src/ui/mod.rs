mod components;
mod grid;
mod renderfns;

pub use grid::{find_column, Column, COLUMNS};

use crate::app::{App, Mode};
use crate::commands;
use crate::query::GridSnapshot;
use chrono::Utc;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Grid
      Constraint::Length(1), // Active filters
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  renderfns::draw_header(frame, chunks[0], app.endpoint(), app.title());

  let snapshot = app.snapshot();
  grid::draw_grid(
    frame,
    chunks[1],
    app.title(),
    snapshot,
    app.selected_row(),
    app.selected_column(),
  );

  renderfns::draw_footer(frame, chunks[2], &snapshot.view);
  draw_status_bar(frame, chunks[3], app);

  match app.mode() {
    Mode::Command => {
      let suggestions = commands::get_suggestions(command_word(app.command_input()));
      components::draw_command_overlay(
        frame,
        chunks[1],
        ":",
        app.command_input(),
        &suggestions,
        app.selected_suggestion(),
      );
    }
    Mode::Search => {
      components::draw_command_overlay(frame, chunks[1], "/", app.search_input(), &[], 0);
    }
    Mode::Normal => {}
  }
}

/// First word of a command line, the part autocomplete works on
pub fn command_word(input: &str) -> &str {
  input.split_whitespace().next().unwrap_or("")
}

/// Right-hand fetch indicator: loading, refreshing, error or data age
fn fetch_indicator<R>(snapshot: &GridSnapshot<R>) -> (String, Color) {
  let color = renderfns::status_color(snapshot.status);
  let text = if snapshot.is_loading() {
    "loading...".to_string()
  } else if snapshot.is_refetching() {
    "refreshing...".to_string()
  } else if let Some(error) = &snapshot.error {
    format!("error: {}", error)
  } else if let Some(fetched_at) = snapshot.fetched_at {
    format!("updated {}", renderfns::format_age(fetched_at, Utc::now()))
  } else {
    String::new()
  };
  (text, color)
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match app.mode() {
    Mode::Normal => match app.message() {
      Some(message) => (message.to_string(), Style::default().fg(Color::Red)),
      None => {
        let hint = " j/k:row  h/l:column  n/p:page  s:sort  /:search  ::command  r:refresh";
        (hint.to_string(), Style::default().fg(Color::DarkGray))
      }
    },
    Mode::Command => {
      let cmd = format!(":{}", app.command_input());
      (cmd, Style::default().fg(Color::Yellow))
    }
    Mode::Search => {
      let search = format!("/{}", app.search_input());
      (search, Style::default().fg(Color::Cyan))
    }
  };

  let (indicator, color) = fetch_indicator(app.snapshot());
  let indicator_width = u16::try_from(indicator.chars().count() + 1).unwrap_or(area.width);
  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Min(1), Constraint::Length(indicator_width)])
    .split(area);

  frame.render_widget(Paragraph::new(content).style(style), chunks[0]);
  frame.render_widget(
    Paragraph::new(indicator)
      .style(Style::default().fg(color))
      .alignment(Alignment::Right),
    chunks[1],
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_command_word() {
    assert_eq!(command_word("filter customer_name eq x"), "filter");
    assert_eq!(command_word("  si"), "si");
    assert_eq!(command_word(""), "");
  }
}
