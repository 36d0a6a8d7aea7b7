//! View-state store: the single writer of `ViewState`, publishing immutable
//! snapshots to subscribers over a watch channel.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::debug;

use super::state::{last_page_index, ColumnFilter, Pagination, SortDirection, SortRule, ViewState};
use crate::error::ViewStateError;

/// Holds the current `ViewState` and publishes every change.
///
/// Each setter builds a complete new state and swaps it in under the channel
/// lock, so subscribers never observe a partially applied update. Setters that
/// leave the state unchanged publish nothing.
#[derive(Clone)]
pub struct ViewStateStore {
  inner: Arc<StoreInner>,
}

struct StoreInner {
  tx: watch::Sender<Arc<ViewState>>,
  initial: Arc<ViewState>,
  /// Server-reported total for the current filters, if known.
  row_count: Mutex<Option<u64>>,
}

impl ViewStateStore {
  pub fn new(initial: ViewState) -> Result<Self, ViewStateError> {
    initial.pagination.validate()?;
    let initial = Arc::new(initial);
    let (tx, _rx) = watch::channel(Arc::clone(&initial));
    Ok(Self {
      inner: Arc::new(StoreInner {
        tx,
        initial,
        row_count: Mutex::new(None),
      }),
    })
  }

  /// Current snapshot.
  pub fn snapshot(&self) -> Arc<ViewState> {
    Arc::clone(&*self.inner.tx.borrow())
  }

  /// Receive every published snapshot from now on.
  pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
    self.inner.tx.subscribe()
  }

  /// Remember the total row count reported for the current state.
  pub fn record_row_count(&self, count: u64) {
    *self
      .inner
      .row_count
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = Some(count);
  }

  /// Record `count` as reported for `view` and, if `view` is still current
  /// and its page lies past the last page, move back to the last page.
  /// Returns true if a clamped state was published.
  pub fn apply_row_count(&self, view: &ViewState, count: u64) -> bool {
    self.record_row_count(count);
    self.update(|state| {
      if *state != *view {
        return;
      }
      let last = last_page_index(count, state.pagination.page_size);
      if state.pagination.page_index > last {
        debug!(
          from = state.pagination.page_index,
          to = last,
          count,
          "page index past row count, clamping"
        );
        state.pagination.page_index = last;
      }
    })
  }

  pub fn row_count(&self) -> Option<u64> {
    *self
      .inner
      .row_count
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  pub fn set_filters(&self, filters: Vec<ColumnFilter>) -> bool {
    self.update(|state| state.filters = filters)
  }

  /// Replace the filter on `filter.column`, or append one if none exists.
  pub fn upsert_filter(&self, filter: ColumnFilter) -> bool {
    self.update(|state| {
      match state.filters.iter_mut().find(|f| f.column == filter.column) {
        Some(existing) => *existing = filter,
        None => state.filters.push(filter),
      }
    })
  }

  pub fn remove_filter(&self, column: &str) -> bool {
    self.update(|state| state.filters.retain(|f| f.column != column))
  }

  pub fn set_global_filter(&self, global_filter: impl Into<String>) -> bool {
    let global_filter = global_filter.into();
    self.update(|state| state.global_filter = global_filter)
  }

  pub fn set_sorting(&self, sorting: Vec<SortRule>) -> bool {
    self.update(|state| state.sorting = sorting)
  }

  /// Cycle a single-column sort: ascending, descending, unsorted.
  pub fn toggle_sort(&self, column: &str) -> bool {
    self.update(|state| {
      let next = match state.sorting.first() {
        Some(rule) if rule.column == column => match rule.direction {
          SortDirection::Asc => vec![SortRule::desc(column)],
          SortDirection::Desc => Vec::new(),
        },
        _ => vec![SortRule::asc(column)],
      };
      state.sorting = next;
    })
  }

  pub fn set_page_index(&self, page_index: usize) -> Result<bool, ViewStateError> {
    self.try_update(|state| {
      let next = Pagination {
        page_index,
        ..state.pagination
      };
      next.validate()?;
      state.pagination = next;
      Ok(())
    })
  }

  /// Advance one page, stopping at the last page when the row count is known.
  pub fn next_page(&self) -> Result<bool, ViewStateError> {
    let row_count = self.row_count();
    self.try_update(|state| {
      let current = state.pagination;
      if let Some(count) = row_count {
        if current.page_index >= last_page_index(count, current.page_size) {
          return Ok(());
        }
      }
      let next = Pagination {
        page_index: current.page_index.saturating_add(1),
        ..current
      };
      next.validate()?;
      state.pagination = next;
      Ok(())
    })
  }

  pub fn previous_page(&self) -> bool {
    self.update(|state| {
      state.pagination.page_index = state.pagination.page_index.saturating_sub(1);
    })
  }

  /// Change the page size.
  ///
  /// The first row of the current page stays on screen: the new index is the
  /// page that contains it under the new size. When the row count is known the
  /// index is then clamped to the last page that exists.
  pub fn set_page_size(&self, page_size: u32) -> Result<bool, ViewStateError> {
    if page_size == 0 {
      return Err(ViewStateError::ZeroPageSize);
    }
    let row_count = self.row_count();
    self.try_update(|state| {
      let top_row = state.pagination.offset();
      let mut page_index = usize::try_from(top_row / u64::from(page_size)).unwrap_or(usize::MAX);
      if let Some(count) = row_count {
        page_index = page_index.min(last_page_index(count, page_size));
      }
      let next = Pagination {
        page_index,
        page_size,
      };
      next.validate()?;
      state.pagination = next;
      Ok(())
    })
  }

  pub fn set_pagination(&self, pagination: Pagination) -> Result<bool, ViewStateError> {
    pagination.validate()?;
    Ok(self.update(|state| state.pagination = pagination))
  }

  /// Return to the state the store was created with.
  pub fn reset(&self) -> bool {
    let initial = ViewState::clone(&self.inner.initial);
    self.update(|state| *state = initial)
  }

  fn update<F>(&self, f: F) -> bool
  where
    F: FnOnce(&mut ViewState),
  {
    let result = self.try_update(|state| {
      f(state);
      Ok(())
    });
    matches!(result, Ok(true))
  }

  fn try_update<F>(&self, f: F) -> Result<bool, ViewStateError>
  where
    F: FnOnce(&mut ViewState) -> Result<(), ViewStateError>,
  {
    let mut error = None;
    let changed = self.inner.tx.send_if_modified(|current| {
      let mut next = ViewState::clone(current);
      if let Err(e) = f(&mut next) {
        error = Some(e);
        return false;
      }
      if next == **current {
        return false;
      }
      debug!(
        page_index = next.pagination.page_index,
        page_size = next.pagination.page_size,
        filters = next.filters.len(),
        sorting = next.sorting.len(),
        "view state changed"
      );
      *current = Arc::new(next);
      true
    });

    match error {
      Some(e) => Err(e),
      None => Ok(changed),
    }
  }
}
