use crate::api::Customer;
use crate::commands::{self, CommandError, GridCommand};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::query::{GridHandle, GridSnapshot};
use crate::ui::{self, COLUMNS};
use crate::view::{last_page_index, SortRule, ViewStateStore};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{debug, info};

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
  Search,
}

/// Main application state
pub struct App {
  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Global filter being edited (after pressing /)
  search_input: String,

  /// Selected autocomplete suggestion index
  selected_suggestion: usize,

  /// Header title and endpoint shown in the header
  title: String,
  endpoint: String,

  /// Running grid controller
  grid: GridHandle<Customer>,

  /// Latest snapshot published by the grid
  snapshot: GridSnapshot<Customer>,

  selected_row: usize,
  selected_column: usize,

  /// Feedback for the last command, shown in the status bar
  message: Option<String>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: &Config, grid: GridHandle<Customer>) -> Result<Self> {
    let snapshot = grid.current();
    Ok(Self {
      mode: Mode::Normal,
      command_input: String::new(),
      search_input: String::new(),
      selected_suggestion: 0,
      title: config.display_title(),
      endpoint: config.endpoint_url()?.to_string(),
      grid,
      snapshot,
      selected_row: 0,
      selected_column: 0,
      message: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    events.forward_changes(self.grid.snapshots());

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
      Event::Key(_) | Event::Resize | Event::Tick => {} // Redraw happens in the loop
      Event::GridChanged => self.sync_snapshot(),
    }
  }

  fn sync_snapshot(&mut self) {
    self.snapshot = self.grid.current();
    let rows = self.snapshot.rows().len();
    self.selected_row = self.selected_row.min(rows.saturating_sub(1));
  }

  fn store(&self) -> &ViewStateStore {
    self.grid.view_store()
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
      Mode::Search => self.handle_search_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_row(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_row(1),
      KeyCode::Char('h') => self.move_column(-1),
      KeyCode::Char('l') => self.move_column(1),
      KeyCode::Right | KeyCode::Char('n') => self.next_page(),
      KeyCode::Left | KeyCode::Char('p') => {
        self.store().previous_page();
      }

      // Grid actions
      KeyCode::Char('s') => {
        let column = COLUMNS[self.selected_column].id;
        self.store().toggle_sort(column);
      }
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Esc => self.message = None,

      // Mode switches
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
        self.message = None;
      }
      KeyCode::Char('/') => {
        self.mode = Mode::Search;
        self.search_input = self.store().snapshot().global_filter.clone();
        self.message = None;
      }

      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        self.selected_suggestion = 0;
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
        self.selected_suggestion = 0;
      }
      KeyCode::Tab | KeyCode::Down => {
        // Navigate autocomplete suggestions
        let suggestions = commands::get_suggestions(ui::command_word(&self.command_input));
        if !suggestions.is_empty() {
          self.selected_suggestion = (self.selected_suggestion + 1) % suggestions.len();
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        // Navigate autocomplete suggestions backwards
        let suggestions = commands::get_suggestions(ui::command_word(&self.command_input));
        if !suggestions.is_empty() {
          self.selected_suggestion = if self.selected_suggestion == 0 {
            suggestions.len() - 1
          } else {
            self.selected_suggestion - 1
          };
        }
      }
      KeyCode::Backspace => {
        self.command_input.pop();
        self.selected_suggestion = 0; // Reset selection on input change
      }
      KeyCode::Char(c) => {
        self.command_input.push(c);
        self.selected_suggestion = 0; // Reset selection on input change
      }
      _ => {}
    }
  }

  fn handle_search_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.search_input.clear();
      }
      KeyCode::Enter => {
        // Apply the global filter and return to normal mode
        let filter = self.search_input.trim().to_string();
        self.store().set_global_filter(filter);
        self.mode = Mode::Normal;
      }
      KeyCode::Backspace => {
        self.search_input.pop();
      }
      KeyCode::Char(c) => {
        self.search_input.push(c);
      }
      _ => {}
    }
  }

  /// Resolve the command line, using the highlighted suggestion when only a
  /// command word was typed.
  fn command_line(&self) -> String {
    let input = self.command_input.trim();
    if input.contains(char::is_whitespace) {
      return input.to_string();
    }
    let suggestions = commands::get_suggestions(input);
    match suggestions.get(self.selected_suggestion) {
      Some(cmd) if !input.is_empty() => cmd.name.to_string(),
      _ => input.to_string(),
    }
  }

  fn execute_command(&mut self) {
    let line = self.command_line();
    self.command_input.clear();

    match commands::parse_command(&line) {
      Ok(command) => {
        debug!(?command, "executing command");
        if let Err(message) = self.apply(command) {
          self.message = Some(message);
        }
      }
      Err(CommandError::Empty) => {}
      Err(e) => self.message = Some(e.to_string()),
    }
  }

  fn apply(&mut self, command: GridCommand) -> Result<(), String> {
    match command {
      GridCommand::Filter(filter) => {
        known_column(&filter.column)?;
        self.store().upsert_filter(filter);
      }
      GridCommand::Unfilter(column) => {
        if !self.store().remove_filter(&column) {
          return Err(format!("no filter on '{}'", column));
        }
      }
      GridCommand::Sort { column, direction } => {
        known_column(&column)?;
        match direction {
          Some(direction) => {
            self.store().set_sorting(vec![SortRule { column, direction }]);
          }
          None => {
            self.store().toggle_sort(&column);
          }
        }
      }
      GridCommand::PageSize(size) => {
        self.store().set_page_size(size).map_err(|e| e.to_string())?;
      }
      GridCommand::Page(index) => {
        if let Some(count) = self.store().row_count() {
          let last = last_page_index(count, self.store().snapshot().page_size());
          if index > last {
            return Err(format!("page {} does not exist (last is {})", index + 1, last + 1));
          }
        }
        self.store().set_page_index(index).map_err(|e| e.to_string())?;
      }
      GridCommand::Clear => {
        self.store().reset();
      }
      GridCommand::Refresh => self.refresh(),
      GridCommand::Quit => self.should_quit = true,
    }
    Ok(())
  }

  fn refresh(&mut self) {
    info!("manual refresh");
    if !self.grid.refresh() {
      self.message = Some("grid controller has stopped".to_string());
    }
  }

  fn next_page(&mut self) {
    if let Err(e) = self.store().next_page() {
      self.message = Some(e.to_string());
    }
  }

  fn move_row(&mut self, delta: i32) {
    let len = self.snapshot.rows().len();
    if len == 0 {
      return;
    }
    self.selected_row = if delta < 0 {
      self.selected_row.saturating_sub(1)
    } else {
      (self.selected_row + 1).min(len - 1)
    };
  }

  fn move_column(&mut self, delta: i32) {
    self.selected_column = if delta < 0 {
      self.selected_column.saturating_sub(1)
    } else {
      (self.selected_column + 1).min(COLUMNS.len() - 1)
    };
  }

  // Accessors for UI
  pub fn mode(&self) -> Mode {
    self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn search_input(&self) -> &str {
    &self.search_input
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn snapshot(&self) -> &GridSnapshot<Customer> {
    &self.snapshot
  }

  pub fn selected_row(&self) -> usize {
    self.selected_row
  }

  pub fn selected_column(&self) -> usize {
    self.selected_column
  }

  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }
}

fn known_column(column: &str) -> Result<(), String> {
  match ui::find_column(column) {
    Some(_) => Ok(()),
    None => Err(format!(
      "unknown column '{}' (one of: {})",
      column,
      COLUMNS.iter().map(|c| c.id).collect::<Vec<_>>().join(", ")
    )),
  }
}
