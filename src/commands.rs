//! Available commands, autocomplete and parsing

use thiserror::Error;

use crate::view::{ColumnFilter, FilterOperator, SortDirection};

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "filter",
    aliases: &["f", "where"],
    usage: "filter <column> <op> <value>",
    description: "Filter a column",
  },
  Command {
    name: "unfilter",
    aliases: &["uf", "nofilter"],
    usage: "unfilter <column>",
    description: "Remove a column filter",
  },
  Command {
    name: "sort",
    aliases: &["o", "order"],
    usage: "sort <column> [asc|desc]",
    description: "Sort by a column",
  },
  Command {
    name: "size",
    aliases: &["ps", "pagesize"],
    usage: "size <n>",
    description: "Rows per page",
  },
  Command {
    name: "page",
    aliases: &["pg", "goto"],
    usage: "page <n>",
    description: "Jump to page (1-based)",
  },
  Command {
    name: "clear",
    aliases: &["c", "reset"],
    usage: "clear",
    description: "Drop filters, sorting and paging",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    usage: "refresh",
    description: "Refetch the current page",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit rowsync",
  },
];

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridCommand {
  Filter(ColumnFilter),
  Unfilter(String),
  /// `None` cycles the column's sort direction
  Sort {
    column: String,
    direction: Option<SortDirection>,
  },
  PageSize(u32),
  /// Zero-based page index
  Page(usize),
  Clear,
  Refresh,
  Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
  #[error("no command given")]
  Empty,

  #[error("unknown command '{0}'")]
  Unknown(String),

  #[error("usage: {0}")]
  Usage(&'static str),

  #[error("{0}")]
  InvalidArgument(String),
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve the command word to a command: exact name or alias first, then
/// the best prefix match.
fn resolve(word: &str) -> Option<&'static Command> {
  let word = word.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == word || cmd.aliases.contains(&word.as_str()))
    .or_else(|| {
      COMMANDS
        .iter()
        .find(|cmd| cmd.name.starts_with(&word))
    })
}

/// Parse a full command line such as `filter customer_name contains acme`.
pub fn parse_command(input: &str) -> Result<GridCommand, CommandError> {
  let mut words = input.split_whitespace();
  let word = words.next().ok_or(CommandError::Empty)?;
  let cmd = resolve(word).ok_or_else(|| CommandError::Unknown(word.to_string()))?;
  let args: Vec<&str> = words.collect();

  match cmd.name {
    "filter" => match args.as_slice() {
      [column, op, value @ ..] if !value.is_empty() => {
        let operator = op
          .parse::<FilterOperator>()
          .map_err(CommandError::InvalidArgument)?;
        Ok(GridCommand::Filter(ColumnFilter::new(
          *column,
          operator,
          value.join(" "),
        )))
      }
      _ => Err(CommandError::Usage(cmd.usage)),
    },
    "unfilter" => match args.as_slice() {
      [column] => Ok(GridCommand::Unfilter(column.to_string())),
      _ => Err(CommandError::Usage(cmd.usage)),
    },
    "sort" => match args.as_slice() {
      [column] => Ok(GridCommand::Sort {
        column: column.to_string(),
        direction: None,
      }),
      [column, direction] => {
        let direction = direction
          .parse::<SortDirection>()
          .map_err(CommandError::InvalidArgument)?;
        Ok(GridCommand::Sort {
          column: column.to_string(),
          direction: Some(direction),
        })
      }
      _ => Err(CommandError::Usage(cmd.usage)),
    },
    "size" => match args.as_slice() {
      [n] => match n.parse::<u32>() {
        Ok(size) if size > 0 => Ok(GridCommand::PageSize(size)),
        _ => Err(CommandError::InvalidArgument(format!(
          "page size must be a positive number, got '{}'",
          n
        ))),
      },
      _ => Err(CommandError::Usage(cmd.usage)),
    },
    "page" => match args.as_slice() {
      [n] => match n.parse::<usize>() {
        Ok(page) if page > 0 => Ok(GridCommand::Page(page - 1)),
        _ => Err(CommandError::InvalidArgument(format!(
          "page must be 1 or greater, got '{}'",
          n
        ))),
      },
      _ => Err(CommandError::Usage(cmd.usage)),
    },
    "clear" => Ok(GridCommand::Clear),
    "refresh" => Ok(GridCommand::Refresh),
    "quit" => Ok(GridCommand::Quit),
    other => Err(CommandError::Unknown(other.to_string())),
  }
}
