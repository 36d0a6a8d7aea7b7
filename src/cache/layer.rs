//! Cache layer that decides between serving cached data and fetching, and
//! coalesces concurrent fetches for the same key.

use chrono::Duration;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, Lookup, PendingFetch, SharedFetch};
use super::store::EntryStore;
use crate::error::FetchError;
use crate::query::QueryKey;

/// Timing policy for a `QueryCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
  /// How long a successful result is served without a network call
  pub stale_time: Duration,
  /// How long an unobserved entry is kept before garbage collection
  pub gc_time: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::seconds(60),
      gc_time: Duration::minutes(5),
    }
  }
}

impl CacheOptions {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }
}

struct CacheState<T> {
  entries: EntryStore<T>,
  in_flight: HashMap<QueryKey, SharedFetch<T>>,
}

/// Keyed result cache with staleness, coalescing and garbage collection.
///
/// Construct one per data source and pass it to whoever needs it; clones
/// share the same entries.
///
/// - At most one fetch per key is in flight; later callers join it.
/// - A successful entry younger than `stale_time` is served without a fetch.
/// - A failed fetch keeps whatever data the entry already had.
/// - Fetches run on their own task, so a caller that stops waiting does not
///   cancel them; the result still lands in the entry for that key.
pub struct QueryCache<T> {
  state: Arc<Mutex<CacheState<T>>>,
  options: CacheOptions,
}

impl<T> Clone for QueryCache<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
      options: self.options,
    }
  }
}

impl<T: Send + Sync + 'static> QueryCache<T> {
  pub fn new(options: CacheOptions) -> Self {
    Self {
      state: Arc::new(Mutex::new(CacheState {
        entries: EntryStore::new(),
        in_flight: HashMap::new(),
      })),
      options,
    }
  }

  pub fn options(&self) -> CacheOptions {
    self.options
  }

  fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Serve `key` from cache when fresh, otherwise fetch it (or join the fetch
  /// already in flight). `fetcher` is only called when a new fetch starts.
  pub fn fetch_or_serve<F, Fut>(&self, key: &QueryKey, fetcher: F) -> Lookup<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    {
      let state = self.lock();
      if let Some(data) = state.entries.fresh_data(key, self.options.stale_time) {
        debug!(key = %key.digest(), "cache hit (fresh)");
        return Lookup::Fresh(data);
      }
      if let Some(joined) = Self::join(&state, key) {
        return Lookup::Pending(joined);
      }
    }

    Lookup::Pending(self.start(key, fetcher))
  }

  /// Fetch `key` regardless of freshness. Joins a fetch already in flight
  /// instead of issuing a second one.
  pub fn refresh<F, Fut>(&self, key: &QueryKey, fetcher: F) -> PendingFetch<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    info!(key = %key.digest(), "forced refresh");
    let joined = Self::join(&self.lock(), key);
    match joined {
      Some(joined) => joined,
      None => self.start(key, fetcher),
    }
  }

  fn join(state: &CacheState<T>, key: &QueryKey) -> Option<PendingFetch<T>> {
    let shared = state.in_flight.get(key)?;
    debug!(key = %key.digest(), "joining in-flight fetch");
    let cached = state.entries.get(key).and_then(|entry| entry.data.clone());
    Some(PendingFetch::new(key.clone(), cached, shared.clone()))
  }

  /// `fetcher` runs without the state lock, so it may call back into the cache.
  fn start<F, Fut>(&self, key: &QueryKey, fetcher: F) -> PendingFetch<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let fetch = fetcher();
    let mut state = self.lock();

    // Another caller started the same key while the fetcher ran.
    if let Some(joined) = Self::join(&state, key) {
      return joined;
    }

    let cached = state.entries.get(key).and_then(|entry| entry.data.clone());
    debug!(key = %key.digest(), stale = cached.is_some(), "cache miss, fetching");
    let shared = self.spawn_fetch(key.clone(), fetch);
    state.in_flight.insert(key.clone(), shared.clone());
    state.entries.mark_loading(key);
    PendingFetch::new(key.clone(), cached, shared)
  }

  fn spawn_fetch<Fut>(&self, key: QueryKey, fetch: Fut) -> SharedFetch<T>
  where
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    let cache = self.clone();

    tokio::spawn(async move {
      let result = match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result.map(Arc::new),
        Err(_) => Err(FetchError::Abandoned),
      };
      cache.settle(&key, &result);
      // Nobody waiting is fine: the entry already holds the result.
      let _ = tx.send(result);
    });

    async move { rx.await.unwrap_or(Err(FetchError::Abandoned)) }
      .boxed()
      .shared()
  }

  fn settle(&self, key: &QueryKey, result: &Result<Arc<T>, FetchError>) {
    let mut state = self.lock();
    state.in_flight.remove(key);
    match result {
      Ok(data) => {
        debug!(key = %key.digest(), "fetch succeeded");
        state.entries.store_success(key, Arc::clone(data));
      }
      Err(e) => {
        warn!(key = %key.digest(), error = %e, "fetch failed");
        state.entries.store_error(key, e.clone());
      }
    }
  }

  /// Snapshot of the entry for `key`.
  pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
    self.lock().entries.get(key).cloned()
  }

  pub fn is_fetching(&self, key: &QueryKey) -> bool {
    self.lock().in_flight.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop the entry for `key`. A fetch already in flight still completes and
  /// recreates it.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    self.lock().entries.remove(key).is_some()
  }

  /// Register interest in `key` until the returned guard is dropped.
  /// Observed entries are never garbage collected.
  pub fn observe(&self, key: &QueryKey) -> Observer<T> {
    self.lock().entries.acquire(key);
    Observer {
      cache: self.clone(),
      key: key.clone(),
    }
  }

  pub fn observers(&self, key: &QueryKey) -> usize {
    self.lock().entries.observers(key)
  }

  /// Evict entries that have been unobserved for `gc_time` and have no fetch
  /// in flight. Returns the number evicted.
  pub fn collect_garbage(&self) -> usize {
    let mut guard = self.lock();
    let state = &mut *guard;
    let in_flight = &state.in_flight;
    let removed = state
      .entries
      .collect(self.options.gc_time, |key| in_flight.contains_key(key));
    if removed > 0 {
      debug!(removed, "garbage collected cache entries");
    }
    removed
  }
}

/// Keeps a cache entry alive while held.
pub struct Observer<T: Send + Sync + 'static> {
  cache: QueryCache<T>,
  key: QueryKey,
}

impl<T: Send + Sync + 'static> Observer<T> {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }
}

impl<T: Send + Sync + 'static> Drop for Observer<T> {
  fn drop(&mut self) {
    self.cache.lock().entries.release(&self.key);
  }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Observer<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Observer").field("key", &self.key).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::FetchStatus;
  use crate::view::ViewState;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration as StdDuration;

  fn key(page: usize) -> QueryKey {
    let mut view = ViewState::default();
    view.pagination.page_index = page;
    QueryKey::build(&view)
  }

  fn pending<T>(lookup: Lookup<T>) -> PendingFetch<T> {
    match lookup {
      Lookup::Pending(p) => p,
      Lookup::Fresh(_) => panic!("expected a pending fetch"),
    }
  }

  fn fresh<T>(lookup: Lookup<T>) -> Arc<T> {
    match lookup {
      Lookup::Fresh(data) => data,
      Lookup::Pending(_) => panic!("expected fresh data"),
    }
  }

  /// Fetcher that counts calls and returns `value` immediately.
  fn counting(
    calls: &Arc<AtomicUsize>,
    value: u32,
  ) -> impl FnOnce() -> futures::future::Ready<Result<u32, FetchError>> {
    let calls = Arc::clone(calls);
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      futures::future::ready(Ok(value))
    }
  }

  async fn wait_idle(cache: &QueryCache<u32>, key: &QueryKey) {
    tokio::time::timeout(StdDuration::from_secs(1), async {
      while cache.is_fetching(key) {
        tokio::task::yield_now().await;
      }
    })
    .await
    .expect("fetch did not settle");
  }

  #[tokio::test]
  async fn test_concurrent_requests_coalesce() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<u32>();

    let first = pending(cache.fetch_or_serve(&key(0), {
      let calls = Arc::clone(&calls);
      move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { rx.await.map_err(|_| FetchError::Abandoned) }
      }
    }));
    let second = pending(cache.fetch_or_serve(&key(0), counting(&calls, 99)));

    assert!(cache.is_fetching(&key(0)));
    assert_eq!(
      cache.entry(&key(0)).map(|e| e.status),
      Some(FetchStatus::Loading)
    );

    tx.send(7).unwrap();
    let (a, b) = futures::join!(first, second);

    assert_eq!(*a.unwrap(), 7);
    assert_eq!(*b.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetcher_can_read_the_cache() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let inner = cache.clone();

    let result = pending(cache.fetch_or_serve(&key(0), move || {
      let seen = inner.entry(&key(0)).is_some() || inner.is_fetching(&key(0));
      let observer = inner.observe(&key(1));
      drop(observer);
      async move { Ok(u32::from(seen)) }
    }))
    .await;
    assert_eq!(*result.unwrap(), 0);

    let inner = cache.clone();
    let refreshed = cache
      .refresh(&key(0), move || {
        let cached = inner.entry(&key(0)).and_then(|e| e.data).map_or(0, |d| *d);
        async move { Ok(cached + 1) }
      })
      .await;
    assert_eq!(*refreshed.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_fresh_entry_served_without_fetch() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let result = pending(cache.fetch_or_serve(&key(0), counting(&calls, 1))).await;
    assert_eq!(*result.unwrap(), 1);

    let served = fresh(cache.fetch_or_serve(&key(0), counting(&calls, 2)));
    assert_eq!(*served, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_entry_refetches_and_exposes_cached() {
    let cache =
      QueryCache::<u32>::new(CacheOptions::default().with_stale_time(Duration::zero()));
    let calls = Arc::new(AtomicUsize::new(0));

    pending(cache.fetch_or_serve(&key(0), counting(&calls, 1)))
      .await
      .unwrap();

    let refetch = pending(cache.fetch_or_serve(&key(0), counting(&calls, 2)));
    assert_eq!(refetch.cached().map(|d| **d), Some(1));
    assert_eq!(*refetch.await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_refresh_bypasses_freshness() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));

    pending(cache.fetch_or_serve(&key(0), counting(&calls, 1)))
      .await
      .unwrap();
    assert!(matches!(
      cache.fetch_or_serve(&key(0), counting(&calls, 9)),
      Lookup::Fresh(_)
    ));

    let refreshed = cache.refresh(&key(0), counting(&calls, 2)).await.unwrap();
    assert_eq!(*refreshed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_refresh_joins_in_flight_fetch() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<u32>();

    let first = pending(cache.fetch_or_serve(&key(0), {
      let calls = Arc::clone(&calls);
      move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { rx.await.map_err(|_| FetchError::Abandoned) }
      }
    }));
    let forced = cache.refresh(&key(0), counting(&calls, 5));

    tx.send(3).unwrap();
    assert_eq!(*forced.await.unwrap(), 3);
    assert_eq!(*first.await.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failure_keeps_previous_data() {
    let cache =
      QueryCache::<u32>::new(CacheOptions::default().with_stale_time(Duration::zero()));
    let calls = Arc::new(AtomicUsize::new(0));

    pending(cache.fetch_or_serve(&key(0), counting(&calls, 4)))
      .await
      .unwrap();

    let failed = pending(cache.fetch_or_serve(&key(0), || async {
      Err::<u32, _>(FetchError::Status { status: 500 })
    }))
    .await;
    assert_eq!(failed, Err(FetchError::Status { status: 500 }));

    let entry = cache.entry(&key(0)).unwrap();
    assert_eq!(entry.status, FetchStatus::Error);
    assert_eq!(entry.data.as_deref(), Some(&4));
    assert_eq!(entry.error, Some(FetchError::Status { status: 500 }));
  }

  #[tokio::test]
  async fn test_failure_without_data_leaves_empty_entry() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let result = pending(cache.fetch_or_serve(&key(0), || async {
      Err::<u32, _>(FetchError::Unauthorized { status: 401 })
    }))
    .await;
    assert!(result.unwrap_err().is_unauthorized());

    let entry = cache.entry(&key(0)).unwrap();
    assert!(entry.data.is_none());
    assert_eq!(entry.status, FetchStatus::Error);

    // An errored entry is not fresh: asking again fetches.
    assert!(matches!(
      cache.fetch_or_serve(&key(0), || async { Ok(1) }),
      Lookup::Pending(_)
    ));
  }

  #[tokio::test]
  async fn test_abandoned_fetch_still_populates_cache() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let (tx, rx) = oneshot::channel::<u32>();

    let handle = pending(cache.fetch_or_serve(&key(3), move || async move {
      rx.await.map_err(|_| FetchError::Abandoned)
    }));
    drop(handle);

    tx.send(42).unwrap();
    wait_idle(&cache, &key(3)).await;

    let served = fresh(cache.fetch_or_serve(&key(3), || async { Ok(0) }));
    assert_eq!(*served, 42);
  }

  #[tokio::test]
  async fn test_out_of_order_completion_is_key_scoped() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let (slow_tx, slow_rx) = oneshot::channel::<u32>();

    let slow = pending(cache.fetch_or_serve(&key(0), move || async move {
      slow_rx.await.map_err(|_| FetchError::Abandoned)
    }));
    let quick = pending(cache.fetch_or_serve(&key(1), || async { Ok(11) }));

    assert_eq!(*quick.await.unwrap(), 11);
    slow_tx.send(10).unwrap();
    assert_eq!(*slow.await.unwrap(), 10);

    assert_eq!(cache.entry(&key(0)).unwrap().data.as_deref(), Some(&10));
    assert_eq!(cache.entry(&key(1)).unwrap().data.as_deref(), Some(&11));
  }

  #[tokio::test]
  async fn test_panicking_fetcher_settles_as_abandoned() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let result = pending(cache.fetch_or_serve(&key(0), || async {
      if true {
        panic!("fetcher blew up");
      }
      Ok(0)
    }))
    .await;

    assert_eq!(result, Err(FetchError::Abandoned));
    assert!(!cache.is_fetching(&key(0)));
    assert_eq!(
      cache.entry(&key(0)).map(|e| e.status),
      Some(FetchStatus::Error)
    );
  }

  #[tokio::test]
  async fn test_garbage_collection_spares_observed_entries() {
    let cache = QueryCache::<u32>::new(CacheOptions::default().with_gc_time(Duration::zero()));

    let observer = cache.observe(&key(0));
    pending(cache.fetch_or_serve(&key(0), || async { Ok(1) }))
      .await
      .unwrap();
    pending(cache.fetch_or_serve(&key(1), || async { Ok(2) }))
      .await
      .unwrap();
    wait_idle(&cache, &key(0)).await;
    wait_idle(&cache, &key(1)).await;

    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.entry(&key(0)).is_some());
    assert!(cache.entry(&key(1)).is_none());

    assert_eq!(cache.observers(&key(0)), 1);
    drop(observer);
    assert_eq!(cache.observers(&key(0)), 0);
    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.is_empty());
  }

  #[tokio::test]
  async fn test_garbage_collection_waits_for_gc_time() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    pending(cache.fetch_or_serve(&key(0), || async { Ok(1) }))
      .await
      .unwrap();
    wait_idle(&cache, &key(0)).await;
    assert_eq!(cache.collect_garbage(), 0);
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch() {
    let cache = QueryCache::<u32>::new(CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));
    pending(cache.fetch_or_serve(&key(0), counting(&calls, 1)))
      .await
      .unwrap();
    wait_idle(&cache, &key(0)).await;

    assert!(cache.invalidate(&key(0)));
    let again = pending(cache.fetch_or_serve(&key(0), counting(&calls, 2)));
    assert!(again.cached().is_none());
    assert_eq!(*again.await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
