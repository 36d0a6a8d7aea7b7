use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::api::Customer;
use crate::query::GridSnapshot;
use crate::ui::renderfns::{format_timestamp, sort_arrow, truncate};
use crate::view::ViewState;

/// A column the grid can show, sort and filter by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  /// Field name sent to the backend
  pub id: &'static str,
  pub title: &'static str,
  pub width: u16,
}

pub const COLUMNS: &[Column] = &[
  Column {
    id: "customer_id",
    title: "ID",
    width: 8,
  },
  Column {
    id: "customer_name",
    title: "Name",
    width: 32,
  },
  Column {
    id: "devices",
    title: "Devices",
    width: 14,
  },
  Column {
    id: "created_at",
    title: "Created",
    width: 17,
  },
  Column {
    id: "updated_at",
    title: "Updated",
    width: 17,
  },
];

pub fn find_column(id: &str) -> Option<&'static Column> {
  COLUMNS.iter().find(|c| c.id == id)
}

fn cell_text(customer: &Customer, column: &Column) -> String {
  match column.id {
    "customer_id" => customer.customer_id.to_string(),
    "customer_name" => truncate(&customer.customer_name, usize::from(column.width)),
    "devices" => format!(
      "{} ({} up)",
      customer.device_count(),
      customer.active_devices()
    ),
    "created_at" => format_timestamp(&customer.created_at),
    "updated_at" => format_timestamp(&customer.updated_at),
    _ => String::new(),
  }
}

fn header_text(view: &ViewState, column: &Column) -> String {
  let mut text = column.title.to_string();
  if let Some(direction) = view.sort_for(column.id) {
    text.push(' ');
    text.push_str(sort_arrow(direction));
  }
  if view.filter_for(column.id).is_some() {
    text.push_str(" *");
  }
  text
}

/// Block title: " Customers [page 2/3] (12) "
pub fn grid_title(title: &str, snapshot: &GridSnapshot<Customer>) -> String {
  let page = snapshot.view.page_index() + 1;
  match snapshot.row_count() {
    Some(count) if !snapshot.is_placeholder => format!(
      " {} [page {}/{}] ({}) ",
      title,
      page,
      snapshot.page_count(),
      count
    ),
    _ => format!(" {} [page {}] ", title, page),
  }
}

/// Draw the data grid for the latest snapshot
pub fn draw_grid(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  snapshot: &GridSnapshot<Customer>,
  selected_row: usize,
  selected_column: usize,
) {
  let block = Block::default()
    .title(grid_title(title, snapshot))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let rows = snapshot.rows();
  if rows.is_empty() {
    let content = if snapshot.is_loading() {
      "Loading..."
    } else if snapshot.is_error() {
      "Failed to load page. Press 'r' to retry."
    } else {
      "No rows match the current filters."
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let header = Row::new(COLUMNS.iter().enumerate().map(|(i, column)| {
    let style = if i == selected_column {
      Style::default().fg(Color::Black).bg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::Cyan).bold()
    };
    Cell::from(header_text(&snapshot.view, column)).style(style)
  }));

  // Rows kept from the previous page are dimmed until the new page lands.
  let row_style = if snapshot.is_placeholder {
    Style::default().fg(Color::DarkGray)
  } else {
    Style::default()
  };

  let body: Vec<Row> = rows
    .iter()
    .map(|customer| {
      Row::new(
        COLUMNS
          .iter()
          .map(|column| Cell::from(cell_text(customer, column))),
      )
      .style(row_style)
    })
    .collect();

  let widths: Vec<Constraint> = COLUMNS
    .iter()
    .map(|c| Constraint::Length(c.width))
    .collect();

  let table = Table::new(body, widths)
    .header(header)
    .block(block)
    .row_highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = TableState::default().with_selected(Some(selected_row.min(rows.len() - 1)));
  frame.render_stateful_widget(table, area, &mut state);
}
