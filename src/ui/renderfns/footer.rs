use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::utils::sort_arrow;
use crate::view::ViewState;

/// Human-readable pieces of the active view-state, in display order
pub fn view_summary(view: &ViewState) -> Vec<String> {
  let mut parts = Vec::new();

  if !view.global_filter.is_empty() {
    parts.push(format!("search \"{}\"", view.global_filter));
  }
  for filter in &view.filters {
    parts.push(format!(
      "{} {} \"{}\"",
      filter.column, filter.operator, filter.value
    ));
  }
  for rule in &view.sorting {
    parts.push(format!("sort {} {}", rule.column, sort_arrow(rule.direction)));
  }

  parts
}

/// Draw the footer bar listing active search, filters and sort order
pub fn draw_footer(frame: &mut Frame, area: Rect, view: &ViewState) {
  let parts = view_summary(view);
  let mut spans = vec![Span::raw(" ")];

  if parts.is_empty() {
    spans.push(Span::styled(
      "no filters",
      Style::default().fg(Color::DarkGray),
    ));
  }

  for (i, part) in parts.into_iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }
    spans.push(Span::styled(part, Style::default().fg(Color::Cyan)));
  }

  let line = Line::from(spans);
  let paragraph = Paragraph::new(line).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}
