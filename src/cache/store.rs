//! In-memory entry storage with observer tracking for garbage collection.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::entry::{CacheEntry, FetchStatus};
use crate::error::FetchError;
use crate::query::QueryKey;

struct Slot<T> {
  entry: CacheEntry<T>,
  observers: usize,
  /// Last moment the entry went from observed to unobserved (or was created)
  released_at: DateTime<Utc>,
}

/// Entries keyed by `QueryKey`. Only the cache layer mutates it.
pub(crate) struct EntryStore<T> {
  slots: HashMap<QueryKey, Slot<T>>,
}

impl<T> EntryStore<T> {
  pub(crate) fn new() -> Self {
    Self {
      slots: HashMap::new(),
    }
  }

  fn slot_mut(&mut self, key: &QueryKey) -> &mut Slot<T> {
    self.slots.entry(key.clone()).or_insert_with(|| Slot {
      entry: CacheEntry::new(key.clone()),
      observers: 0,
      released_at: Utc::now(),
    })
  }

  pub(crate) fn get(&self, key: &QueryKey) -> Option<&CacheEntry<T>> {
    self.slots.get(key).map(|slot| &slot.entry)
  }

  pub(crate) fn len(&self) -> usize {
    self.slots.len()
  }

  pub(crate) fn remove(&mut self, key: &QueryKey) -> Option<CacheEntry<T>> {
    self.slots.remove(key).map(|slot| slot.entry)
  }

  /// Successful data younger than `stale_time`, if any.
  pub(crate) fn fresh_data(&self, key: &QueryKey, stale_time: Duration) -> Option<Arc<T>> {
    let entry = self.get(key)?;
    let fetched_at = entry.fetched_at?;
    let data = entry.data.as_ref()?;
    if entry.status == FetchStatus::Success && Utc::now() - fetched_at < stale_time {
      Some(Arc::clone(data))
    } else {
      None
    }
  }

  pub(crate) fn mark_loading(&mut self, key: &QueryKey) {
    self.slot_mut(key).entry.status = FetchStatus::Loading;
  }

  pub(crate) fn store_success(&mut self, key: &QueryKey, data: Arc<T>) {
    let entry = &mut self.slot_mut(key).entry;
    entry.data = Some(data);
    entry.status = FetchStatus::Success;
    entry.fetched_at = Some(Utc::now());
    entry.error = None;
  }

  /// Record a failure without touching previously fetched data.
  pub(crate) fn store_error(&mut self, key: &QueryKey, error: FetchError) {
    let entry = &mut self.slot_mut(key).entry;
    entry.status = FetchStatus::Error;
    entry.error = Some(error);
  }

  pub(crate) fn acquire(&mut self, key: &QueryKey) {
    self.slot_mut(key).observers += 1;
  }

  pub(crate) fn release(&mut self, key: &QueryKey) {
    if let Some(slot) = self.slots.get_mut(key) {
      slot.observers = slot.observers.saturating_sub(1);
      if slot.observers == 0 {
        slot.released_at = Utc::now();
      }
    }
  }

  pub(crate) fn observers(&self, key: &QueryKey) -> usize {
    self.slots.get(key).map(|slot| slot.observers).unwrap_or(0)
  }

  /// Drop entries nobody has observed for at least `gc_time`, skipping keys
  /// for which `keep` returns true. Returns how many were dropped.
  pub(crate) fn collect<F>(&mut self, gc_time: Duration, keep: F) -> usize
  where
    F: Fn(&QueryKey) -> bool,
  {
    let now = Utc::now();
    let before = self.slots.len();
    self
      .slots
      .retain(|key, slot| slot.observers > 0 || keep(key) || now - slot.released_at < gc_time);
    before - self.slots.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::view::ViewState;

  fn key(page: usize) -> QueryKey {
    let mut view = ViewState::default();
    view.pagination.page_index = page;
    QueryKey::build(&view)
  }

  #[test]
  fn test_error_keeps_previous_data() {
    let mut store = EntryStore::new();
    let k = key(0);
    store.store_success(&k, Arc::new(7));
    store.store_error(&k, FetchError::Status { status: 502 });

    let entry = store.get(&k).unwrap();
    assert_eq!(entry.status, FetchStatus::Error);
    assert_eq!(entry.data.as_deref(), Some(&7));
    assert_eq!(entry.error, Some(FetchError::Status { status: 502 }));
  }

  #[test]
  fn test_success_clears_error() {
    let mut store = EntryStore::new();
    let k = key(0);
    store.store_error(&k, FetchError::Abandoned);
    store.store_success(&k, Arc::new(1));
    assert!(store.get(&k).unwrap().error.is_none());
  }

  #[test]
  fn test_fresh_data_respects_stale_time() {
    let mut store = EntryStore::new();
    let k = key(0);
    store.store_success(&k, Arc::new(1));
    assert!(store.fresh_data(&k, Duration::minutes(1)).is_some());
    assert!(store.fresh_data(&k, Duration::zero()).is_none());
    assert!(store.fresh_data(&key(1), Duration::minutes(1)).is_none());
  }

  #[test]
  fn test_collect_skips_observed_and_kept() {
    let mut store: EntryStore<u32> = EntryStore::new();
    store.acquire(&key(0));
    store.mark_loading(&key(1));
    store.mark_loading(&key(2));

    let removed = store.collect(Duration::zero(), |k| *k == key(1));
    assert_eq!(removed, 1);
    assert!(store.get(&key(0)).is_some());
    assert!(store.get(&key(1)).is_some());
    assert!(store.get(&key(2)).is_none());

    store.release(&key(0));
    assert_eq!(store.observers(&key(0)), 0);
    assert_eq!(store.collect(Duration::hours(1), |_| false), 0);
    assert_eq!(store.collect(Duration::zero(), |_| false), 2);
  }
}
