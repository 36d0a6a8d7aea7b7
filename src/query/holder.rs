//! Two-slot result holder implementing "keep previous data".

use std::sync::Arc;

use super::QueryKey;
use crate::cache::FetchStatus;
use crate::error::FetchError;

struct KeyResult<T> {
  key: QueryKey,
  data: Option<Arc<T>>,
  status: FetchStatus,
  error: Option<FetchError>,
}

/// Tracks the result for the active key next to the last data that was shown.
///
/// While the active key has nothing to show yet and is loading, the last good
/// value (usually from the previous key) stays visible. A success for the
/// active key replaces it in one step. An error never brings back another
/// key's data: it shows the key's own earlier data, or nothing.
pub struct ResultHolder<T> {
  current: Option<KeyResult<T>>,
  last_good: Option<(QueryKey, Arc<T>)>,
}

impl<T> Default for ResultHolder<T> {
  fn default() -> Self {
    Self {
      current: None,
      last_good: None,
    }
  }
}

impl<T> ResultHolder<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current_key(&self) -> Option<&QueryKey> {
    self.current.as_ref().map(|c| &c.key)
  }

  /// Make `key` the active key. `cached` is whatever the cache already has
  /// for it, fresh or stale.
  pub fn activate(&mut self, key: QueryKey, cached: Option<Arc<T>>, status: FetchStatus) {
    if let Some(data) = &cached {
      self.last_good = Some((key.clone(), Arc::clone(data)));
    }
    self.current = Some(KeyResult {
      key,
      data: cached,
      status,
      error: None,
    });
  }

  /// A new fetch for the active key started.
  pub fn mark_loading(&mut self, key: &QueryKey) {
    if let Some(current) = self.current.as_mut().filter(|c| &c.key == key) {
      current.status = FetchStatus::Loading;
    }
  }

  /// Apply a finished fetch. Returns false when `key` is no longer active,
  /// in which case nothing visible changes.
  pub fn settle(&mut self, key: &QueryKey, result: Result<Arc<T>, FetchError>) -> bool {
    let current = match self.current.as_mut() {
      Some(current) if &current.key == key => current,
      _ => return false,
    };

    match result {
      Ok(data) => {
        self.last_good = Some((key.clone(), Arc::clone(&data)));
        current.data = Some(data);
        current.status = FetchStatus::Success;
        current.error = None;
      }
      Err(e) => {
        current.status = FetchStatus::Error;
        current.error = Some(e);
      }
    }
    true
  }

  pub fn status(&self) -> FetchStatus {
    self
      .current
      .as_ref()
      .map(|c| c.status)
      .unwrap_or_default()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.current.as_ref().and_then(|c| c.error.as_ref())
  }

  /// The value to display right now.
  pub fn visible(&self) -> Option<&Arc<T>> {
    let current = self.current.as_ref()?;
    match (&current.data, current.status) {
      (Some(data), _) => Some(data),
      (None, FetchStatus::Loading) => self.last_good.as_ref().map(|(_, data)| data),
      (None, _) => None,
    }
  }

  /// Whether `visible()` is standing in for a key that is not active.
  pub fn is_placeholder(&self) -> bool {
    match &self.current {
      Some(current) => current.data.is_none() && self.visible().is_some(),
      None => false,
    }
  }
}
