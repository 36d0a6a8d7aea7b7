//! Local view-state: which page, filters and sort order the user wants.

mod state;
mod store;

pub use state::{
  last_page_index, ColumnFilter, FilterOperator, Pagination, SortDirection, SortRule, ViewState,
  DEFAULT_PAGE_SIZE,
};
pub use store::ViewStateStore;
