//! View-state value types: what page, filters and sort order the user wants.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ViewStateError;

/// Page size used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Comparison applied by a column filter on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
  Contains,
  Equals,
  NotEquals,
  StartsWith,
  EndsWith,
  GreaterThan,
  LessThan,
}

impl FilterOperator {
  pub fn as_str(&self) -> &'static str {
    match self {
      FilterOperator::Contains => "contains",
      FilterOperator::Equals => "equals",
      FilterOperator::NotEquals => "notEquals",
      FilterOperator::StartsWith => "startsWith",
      FilterOperator::EndsWith => "endsWith",
      FilterOperator::GreaterThan => "greaterThan",
      FilterOperator::LessThan => "lessThan",
    }
  }
}

impl fmt::Display for FilterOperator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FilterOperator {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "contains" | "~" => Ok(FilterOperator::Contains),
      "equals" | "eq" | "=" => Ok(FilterOperator::Equals),
      "notequals" | "ne" | "!=" => Ok(FilterOperator::NotEquals),
      "startswith" | "^" => Ok(FilterOperator::StartsWith),
      "endswith" | "$" => Ok(FilterOperator::EndsWith),
      "greaterthan" | "gt" | ">" => Ok(FilterOperator::GreaterThan),
      "lessthan" | "lt" | "<" => Ok(FilterOperator::LessThan),
      other => Err(format!("unknown filter operator '{}'", other)),
    }
  }
}

/// A filter on a single column, e.g. `customer_name contains "acme"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnFilter {
  #[serde(rename = "id")]
  pub column: String,
  pub operator: FilterOperator,
  pub value: String,
}

impl ColumnFilter {
  pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
    Self {
      column: column.into(),
      operator,
      value: value.into(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
  #[default]
  Asc,
  Desc,
}

impl FromStr for SortDirection {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "asc" | "a" | "up" => Ok(SortDirection::Asc),
      "desc" | "d" | "down" => Ok(SortDirection::Desc),
      other => Err(format!("unknown sort direction '{}'", other)),
    }
  }
}

/// One entry of the sort order. Earlier entries take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortRule {
  pub column: String,
  pub direction: SortDirection,
}

impl SortRule {
  pub fn asc(column: impl Into<String>) -> Self {
    Self {
      column: column.into(),
      direction: SortDirection::Asc,
    }
  }

  pub fn desc(column: impl Into<String>) -> Self {
    Self {
      column: column.into(),
      direction: SortDirection::Desc,
    }
  }

  pub fn is_desc(&self) -> bool {
    self.direction == SortDirection::Desc
  }
}

// The backend reads sorting as `{"id": column, "desc": bool}`.
impl Serialize for SortRule {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("SortRule", 2)?;
    state.serialize_field("id", &self.column)?;
    state.serialize_field("desc", &self.is_desc())?;
    state.end()
  }
}

/// Zero-based page position. The request offset is always derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pagination {
  pub page_index: usize,
  pub page_size: u32,
}

impl Pagination {
  pub fn new(page_index: usize, page_size: u32) -> Result<Self, ViewStateError> {
    let pagination = Self {
      page_index,
      page_size,
    };
    pagination.validate()?;
    Ok(pagination)
  }

  /// Reject states the key builder and request translator cannot use.
  pub fn validate(&self) -> Result<(), ViewStateError> {
    if self.page_size == 0 {
      return Err(ViewStateError::ZeroPageSize);
    }
    if self.checked_offset().is_none() {
      return Err(ViewStateError::OffsetOverflow {
        page_index: self.page_index,
        page_size: self.page_size,
      });
    }
    Ok(())
  }

  fn checked_offset(&self) -> Option<u64> {
    u64::try_from(self.page_index)
      .ok()?
      .checked_mul(u64::from(self.page_size))
  }

  /// Index of the first row on this page.
  pub fn offset(&self) -> u64 {
    self.checked_offset().unwrap_or(u64::MAX)
  }

  pub fn limit(&self) -> u32 {
    self.page_size
  }
}

impl Default for Pagination {
  fn default() -> Self {
    Self {
      page_index: 0,
      page_size: DEFAULT_PAGE_SIZE,
    }
  }
}

/// Index of the last page that holds at least one row (0 when there are none).
pub fn last_page_index(row_count: u64, page_size: u32) -> usize {
  if row_count == 0 || page_size == 0 {
    return 0;
  }
  let last = (row_count - 1) / u64::from(page_size);
  usize::try_from(last).unwrap_or(usize::MAX)
}

/// Everything the backend needs to know to produce the visible page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ViewState {
  pub filters: Vec<ColumnFilter>,
  pub global_filter: String,
  pub sorting: Vec<SortRule>,
  pub pagination: Pagination,
}

impl ViewState {
  pub fn with_page_size(page_size: u32) -> Result<Self, ViewStateError> {
    Ok(Self {
      pagination: Pagination::new(0, page_size)?,
      ..Self::default()
    })
  }

  pub fn page_index(&self) -> usize {
    self.pagination.page_index
  }

  pub fn page_size(&self) -> u32 {
    self.pagination.page_size
  }

  pub fn sort_for(&self, column: &str) -> Option<SortDirection> {
    self
      .sorting
      .iter()
      .find(|rule| rule.column == column)
      .map(|rule| rule.direction)
  }

  pub fn filter_for(&self, column: &str) -> Option<&ColumnFilter> {
    self.filters.iter().find(|f| f.column == column)
  }
}
