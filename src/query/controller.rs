//! Grid controller: turns view-state changes into cache lookups and publishes
//! what the table should render.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::holder::ResultHolder;
use super::{PageSource, QueryKey};
use crate::api::Page;
use crate::cache::{FetchStatus, Lookup, Observer, PendingFetch, QueryCache};
use crate::error::FetchError;
use crate::view::{last_page_index, ViewState, ViewStateStore};

type Settled<R> = (QueryKey, Result<Arc<Page<R>>, FetchError>);

/// Everything the table needs for one frame.
#[derive(Debug)]
pub struct GridSnapshot<R> {
  pub view: Arc<ViewState>,
  /// Key of the active query, `None` before the first activation
  pub key: Option<QueryKey>,
  /// Rows to show. May belong to a previous key, see `is_placeholder`
  pub page: Option<Arc<Page<R>>>,
  pub status: FetchStatus,
  pub error: Option<FetchError>,
  pub is_placeholder: bool,
  /// When the active key's cached data was fetched
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<R> Clone for GridSnapshot<R> {
  fn clone(&self) -> Self {
    Self {
      view: Arc::clone(&self.view),
      key: self.key.clone(),
      page: self.page.clone(),
      status: self.status,
      error: self.error.clone(),
      is_placeholder: self.is_placeholder,
      fetched_at: self.fetched_at,
    }
  }
}

impl<R> GridSnapshot<R> {
  fn empty(view: Arc<ViewState>) -> Self {
    Self {
      view,
      key: None,
      page: None,
      status: FetchStatus::Idle,
      error: None,
      is_placeholder: false,
      fetched_at: None,
    }
  }

  pub fn rows(&self) -> &[R] {
    self
      .page
      .as_ref()
      .map(|p| p.results.as_slice())
      .unwrap_or(&[])
  }

  /// Total rows for the shown data's filters.
  pub fn row_count(&self) -> Option<u64> {
    self.page.as_ref().map(|p| p.count)
  }

  /// Number of pages at the current page size, at least 1.
  pub fn page_count(&self) -> usize {
    let count = self.row_count().unwrap_or(0);
    last_page_index(count, self.view.page_size()).saturating_add(1)
  }

  /// A fetch is running and there is nothing to show for it yet.
  pub fn is_loading(&self) -> bool {
    self.status.is_loading() && (self.page.is_none() || self.is_placeholder)
  }

  /// A fetch is running over data that belongs to the active key.
  pub fn is_refetching(&self) -> bool {
    self.status.is_loading() && self.page.is_some() && !self.is_placeholder
  }

  pub fn is_error(&self) -> bool {
    self.status.is_error()
  }
}

/// Drives a `QueryCache` from a `ViewStateStore`.
///
/// Every published view-state is turned into a key. The key is served from
/// cache when fresh and fetched otherwise, with identical in-flight requests
/// joined. The result is published as a `GridSnapshot` once it lands, unless
/// the view has moved on in the meantime.
pub struct GridController<R: Send + Sync + 'static> {
  cache: QueryCache<Page<R>>,
  source: Arc<dyn PageSource<R>>,
  store: ViewStateStore,
  scope: String,
  view: Arc<ViewState>,
  holder: ResultHolder<Page<R>>,
  observer: Option<Observer<Page<R>>>,
  in_flight: FuturesUnordered<BoxFuture<'static, Settled<R>>>,
  snapshots: watch::Sender<GridSnapshot<R>>,
}

impl<R: Send + Sync + 'static> GridController<R> {
  pub fn new(
    cache: QueryCache<Page<R>>,
    source: Arc<dyn PageSource<R>>,
    store: ViewStateStore,
    scope: impl Into<String>,
  ) -> Self {
    let view = store.snapshot();
    let (snapshots, _rx) = watch::channel(GridSnapshot::empty(Arc::clone(&view)));
    Self {
      cache,
      source,
      store,
      scope: scope.into(),
      view,
      holder: ResultHolder::new(),
      observer: None,
      in_flight: FuturesUnordered::new(),
      snapshots,
    }
  }

  /// Run the controller on its own task.
  pub fn spawn(self) -> GridHandle<R> {
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
    let handle = GridHandle {
      store: self.store.clone(),
      snapshots: self.snapshots.subscribe(),
      refresh_tx,
    };
    let views = self.store.subscribe();
    tokio::spawn(self.run(views, refresh_rx));
    handle
  }

  /// Event loop. Ends when every `GridHandle` is gone.
  pub async fn run(
    mut self,
    mut views: watch::Receiver<Arc<ViewState>>,
    mut refresh: mpsc::UnboundedReceiver<()>,
  ) {
    let initial = Arc::clone(&*views.borrow_and_update());
    self.activate(initial);

    loop {
      tokio::select! {
        changed = views.changed() => {
          if changed.is_err() {
            break;
          }
          let view = Arc::clone(&*views.borrow_and_update());
          self.activate(view);
        }
        signal = refresh.recv() => match signal {
          Some(()) => self.refresh(),
          None => break,
        },
        Some((key, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
          self.settle(key, result);
        }
      }
    }

    debug!("grid controller stopped");
  }

  fn activate(&mut self, view: Arc<ViewState>) {
    self.view = Arc::clone(&view);
    let key = QueryKey::scoped(&self.scope, &view);

    if self.holder.current_key() == Some(&key) {
      self.publish();
      return;
    }

    debug!(
      key = %key.digest(),
      page_index = view.page_index(),
      page_size = view.page_size(),
      "activating query"
    );

    // Observe the new key before releasing the old one.
    if let Some(previous) = self.observer.replace(self.cache.observe(&key)) {
      debug!(released = %previous.key().digest(), "query no longer observed");
    }

    let source = Arc::clone(&self.source);
    let fetch_view = ViewState::clone(&view);
    match self
      .cache
      .fetch_or_serve(&key, move || source.fetch_page(&fetch_view))
    {
      Lookup::Fresh(page) => {
        self.store.apply_row_count(&view, page.count);
        self.holder.activate(key, Some(page), FetchStatus::Success);
      }
      Lookup::Pending(pending) => {
        let cached = pending.cached().cloned();
        self.holder.activate(key, cached, FetchStatus::Loading);
        self.track(pending);
      }
    }

    let collected = self.cache.collect_garbage();
    if collected > 0 {
      debug!(collected, "collected unobserved cache entries");
    }
    self.publish();
  }

  /// Refetch the active key regardless of freshness.
  fn refresh(&mut self) {
    let Some(key) = self.holder.current_key().cloned() else {
      return;
    };
    info!(key = %key.digest(), "refresh requested");

    let source = Arc::clone(&self.source);
    let fetch_view = ViewState::clone(&self.view);
    let pending = self
      .cache
      .refresh(&key, move || source.fetch_page(&fetch_view));
    self.holder.mark_loading(&key);
    self.track(pending);
    self.publish();
  }

  fn track(&mut self, pending: PendingFetch<Page<R>>) {
    let key = pending.key().clone();
    self
      .in_flight
      .push(async move { (key, pending.await) }.boxed());
  }

  fn settle(&mut self, key: QueryKey, result: Result<Arc<Page<R>>, FetchError>) {
    if let Err(e) = &result {
      warn!(key = %key.digest(), error = %e, "page fetch failed");
    }
    let row_count = result.as_ref().ok().map(|page| page.count);

    if !self.holder.settle(&key, result) {
      debug!(key = %key.digest(), "result for inactive query cached only");
      return;
    }
    if let Some(count) = row_count {
      // A clamped page index comes back as a view change.
      self.store.apply_row_count(&self.view, count);
    }
    self.publish();
  }

  fn publish(&self) {
    let key = self.holder.current_key().cloned();
    let fetched_at = key
      .as_ref()
      .and_then(|k| self.cache.entry(k))
      .and_then(|entry| entry.fetched_at);

    self.snapshots.send_replace(GridSnapshot {
      view: Arc::clone(&self.view),
      key,
      page: self.holder.visible().cloned(),
      status: self.holder.status(),
      error: self.holder.error().cloned(),
      is_placeholder: self.holder.is_placeholder(),
      fetched_at,
    });
  }
}

/// Handle to a running `GridController`.
pub struct GridHandle<R> {
  store: ViewStateStore,
  snapshots: watch::Receiver<GridSnapshot<R>>,
  refresh_tx: mpsc::UnboundedSender<()>,
}

impl<R> Clone for GridHandle<R> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      snapshots: self.snapshots.clone(),
      refresh_tx: self.refresh_tx.clone(),
    }
  }
}

impl<R> GridHandle<R> {
  /// The store whose changes drive this grid.
  pub fn view_store(&self) -> &ViewStateStore {
    &self.store
  }

  /// Latest published snapshot.
  pub fn current(&self) -> GridSnapshot<R> {
    GridSnapshot::clone(&self.snapshots.borrow())
  }

  /// Receiver for every published snapshot.
  pub fn snapshots(&self) -> watch::Receiver<GridSnapshot<R>> {
    self.snapshots.clone()
  }

  /// Refetch the current page, bypassing freshness. Returns false if the
  /// controller has stopped.
  pub fn refresh(&self) -> bool {
    self.refresh_tx.send(()).is_ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheOptions;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;
  use tokio::sync::Semaphore;

  /// Serves `0..total` in pages. Each page index has its own gate so tests
  /// decide when and in which order fetches complete.
  #[derive(Clone, Default)]
  struct FakeSource {
    total: u64,
    /// Row count while a global filter is set, `total` if unset
    filtered_total: Option<u64>,
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    gates: Arc<Mutex<HashMap<usize, Arc<Semaphore>>>>,
  }

  impl FakeSource {
    fn new(total: u64) -> Self {
      Self {
        total,
        ..Self::default()
      }
    }

    fn gate(&self, page_index: usize) -> Arc<Semaphore> {
      let mut gates = self.gates.lock().unwrap();
      Arc::clone(
        gates
          .entry(page_index)
          .or_insert_with(|| Arc::new(Semaphore::new(0))),
      )
    }

    fn release(&self, page_index: usize) {
      self.gate(page_index).add_permits(1);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl PageSource<u64> for FakeSource {
    fn fetch_page(&self, view: &ViewState) -> BoxFuture<'static, Result<Page<u64>, FetchError>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let gate = self.gate(view.page_index());
      let fail = Arc::clone(&self.fail);
      let offset = view.pagination.offset();
      let total = match self.filtered_total {
        Some(filtered) if !view.global_filter.is_empty() => filtered,
        _ => self.total,
      };
      let end = (offset + u64::from(view.pagination.limit())).min(total);

      async move {
        gate
          .acquire()
          .await
          .map_err(|_| FetchError::Abandoned)?
          .forget();
        if fail.load(Ordering::SeqCst) {
          return Err(FetchError::Status { status: 500 });
        }
        Ok(Page {
          count: total,
          results: (offset..end).collect(),
        })
      }
      .boxed()
    }
  }

  struct Harness {
    source: FakeSource,
    cache: QueryCache<Page<u64>>,
    handle: GridHandle<u64>,
    rx: watch::Receiver<GridSnapshot<u64>>,
  }

  fn start(total: u64) -> Harness {
    start_with(FakeSource::new(total))
  }

  fn start_with(source: FakeSource) -> Harness {
    let cache = QueryCache::new(CacheOptions::default());
    let store = ViewStateStore::new(ViewState::default()).unwrap();
    let controller = GridController::new(
      cache.clone(),
      Arc::new(source.clone()),
      store,
      crate::query::DEFAULT_SCOPE,
    );
    let handle = controller.spawn();
    let rx = handle.snapshots();
    Harness {
      source,
      cache,
      handle,
      rx,
    }
  }

  async fn wait_for(
    rx: &mut watch::Receiver<GridSnapshot<u64>>,
    condition: impl FnMut(&GridSnapshot<u64>) -> bool,
  ) -> GridSnapshot<u64> {
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(condition))
      .await
      .expect("timed out waiting for snapshot")
      .expect("controller stopped");
    GridSnapshot::clone(&*snapshot)
  }

  fn key_for(page_index: usize) -> QueryKey {
    let mut view = ViewState::default();
    view.pagination.page_index = page_index;
    QueryKey::build(&view)
  }

  async fn first_page_loaded(h: &mut Harness) -> GridSnapshot<u64> {
    h.source.release(0);
    wait_for(&mut h.rx, |s| {
      s.key.as_ref() == Some(&key_for(0)) && s.status == FetchStatus::Success
    })
    .await
  }

  #[tokio::test]
  async fn test_first_page_loads() {
    let mut h = start(12);
    let loading = wait_for(&mut h.rx, |s| s.key.is_some()).await;
    assert!(loading.is_loading());
    assert!(loading.rows().is_empty());

    let loaded = first_page_loaded(&mut h).await;
    assert_eq!(loaded.rows(), &[0, 1, 2, 3, 4]);
    assert_eq!(loaded.row_count(), Some(12));
    assert_eq!(loaded.page_count(), 3);
    assert!(loaded.fetched_at.is_some());
    assert_eq!(h.handle.view_store().row_count(), Some(12));
    assert_eq!(h.source.calls(), 1);
  }

  #[tokio::test]
  async fn test_next_page_keeps_previous_rows_until_resolved() {
    let mut h = start(12);
    first_page_loaded(&mut h).await;

    h.handle.view_store().set_page_index(1).unwrap();
    let pending = wait_for(&mut h.rx, |s| s.key.as_ref() == Some(&key_for(1))).await;
    assert!(pending.is_placeholder);
    assert!(pending.is_loading());
    assert_eq!(pending.rows(), &[0, 1, 2, 3, 4]);
    assert_eq!(pending.view.page_index(), 1);

    h.source.release(1);
    let loaded = wait_for(&mut h.rx, |s| s.status == FetchStatus::Success).await;
    assert_eq!(loaded.rows(), &[5, 6, 7, 8, 9]);
    assert!(!loaded.is_placeholder);
  }

  #[tokio::test]
  async fn test_fresh_page_is_served_without_fetching() {
    let mut h = start(12);
    first_page_loaded(&mut h).await;

    h.handle.view_store().set_page_index(1).unwrap();
    h.source.release(1);
    wait_for(&mut h.rx, |s| {
      s.key.as_ref() == Some(&key_for(1)) && s.status == FetchStatus::Success
    })
    .await;

    h.handle.view_store().set_page_index(0).unwrap();
    let back = wait_for(&mut h.rx, |s| s.key.as_ref() == Some(&key_for(0))).await;
    assert_eq!(back.status, FetchStatus::Success);
    assert_eq!(back.rows(), &[0, 1, 2, 3, 4]);
    assert_eq!(h.source.calls(), 2);
  }

  #[tokio::test]
  async fn test_refresh_refetches_fresh_page() {
    let mut h = start(12);
    first_page_loaded(&mut h).await;

    assert!(h.handle.refresh());
    let refetching = wait_for(&mut h.rx, |s| s.status.is_loading()).await;
    assert!(refetching.is_refetching());
    assert_eq!(refetching.rows().len(), 5);
    assert_eq!(h.source.calls(), 2);

    h.source.release(0);
    wait_for(&mut h.rx, |s| s.status == FetchStatus::Success).await;
  }

  #[tokio::test]
  async fn test_error_without_prior_data_shows_empty_grid() {
    let mut h = start(12);
    h.source.fail.store(true, Ordering::SeqCst);
    h.source.release(0);

    let failed = wait_for(&mut h.rx, |s| s.is_error()).await;
    assert!(failed.rows().is_empty());
    assert_eq!(failed.error, Some(FetchError::Status { status: 500 }));
    assert!(!failed.is_placeholder);
  }

  #[tokio::test]
  async fn test_failed_refresh_keeps_rows() {
    let mut h = start(12);
    first_page_loaded(&mut h).await;

    h.source.fail.store(true, Ordering::SeqCst);
    h.handle.refresh();
    h.source.release(0);

    let failed = wait_for(&mut h.rx, |s| s.is_error()).await;
    assert_eq!(failed.rows(), &[0, 1, 2, 3, 4]);
    assert!(failed.error.is_some());
  }

  #[tokio::test]
  async fn test_error_on_new_page_does_not_show_old_rows() {
    let mut h = start(12);
    first_page_loaded(&mut h).await;

    h.source.fail.store(true, Ordering::SeqCst);
    h.handle.view_store().set_page_index(1).unwrap();
    h.source.release(1);

    let failed = wait_for(&mut h.rx, |s| s.is_error()).await;
    assert_eq!(failed.key, Some(key_for(1)));
    assert!(failed.rows().is_empty());
  }

  #[tokio::test]
  async fn test_late_result_for_previous_page_is_not_shown() {
    let mut h = start(20);
    first_page_loaded(&mut h).await;

    let store = h.handle.view_store().clone();
    store.set_page_index(1).unwrap();
    wait_for(&mut h.rx, |s| s.key.as_ref() == Some(&key_for(1))).await;
    store.set_page_index(2).unwrap();
    wait_for(&mut h.rx, |s| s.key.as_ref() == Some(&key_for(2))).await;

    h.source.release(2);
    let shown = wait_for(&mut h.rx, |s| s.status == FetchStatus::Success).await;
    assert_eq!(shown.rows(), &[10, 11, 12, 13, 14]);

    h.source.release(1);
    tokio::time::timeout(Duration::from_secs(2), async {
      while h.cache.entry(&key_for(1)).and_then(|e| e.data).is_none() {
        tokio::task::yield_now().await;
      }
    })
    .await
    .expect("page 1 never reached the cache");

    let current = h.handle.current();
    assert_eq!(current.key, Some(key_for(2)));
    assert_eq!(current.rows(), &[10, 11, 12, 13, 14]);
  }

  #[tokio::test]
  async fn test_returning_to_cached_view_skips_fetch() {
    let mut h = start(12);
    first_page_loaded(&mut h).await;

    let store = h.handle.view_store().clone();
    store.set_global_filter("acme");
    wait_for(&mut h.rx, |s| s.view.global_filter == "acme").await;
    store.set_global_filter("");
    let back = wait_for(&mut h.rx, |s| s.view.global_filter.is_empty()).await;

    assert_eq!(back.key, Some(key_for(0)));
    assert_eq!(back.status, FetchStatus::Success);
    assert_eq!(h.source.calls(), 2);
  }

  #[tokio::test]
  async fn test_narrowed_results_move_back_to_last_page() {
    let source = FakeSource {
      filtered_total: Some(3),
      ..FakeSource::new(100)
    };
    let mut h = start_with(source);
    first_page_loaded(&mut h).await;

    let store = h.handle.view_store().clone();
    store.set_page_index(4).unwrap();
    h.source.release(4);
    let deep = wait_for(&mut h.rx, |s| {
      s.key.as_ref() == Some(&key_for(4)) && s.status == FetchStatus::Success
    })
    .await;
    assert_eq!(deep.rows(), &[20, 21, 22, 23, 24]);

    // The filtered page 4 comes back empty with a count of 3, which leaves
    // only page 0.
    store.set_global_filter("acme");
    h.source.release(4);
    h.source.release(0);

    let clamped = wait_for(&mut h.rx, |s| {
      s.view.global_filter == "acme"
        && s.view.page_index() == 0
        && s.status == FetchStatus::Success
    })
    .await;
    assert_eq!(clamped.rows(), &[0, 1, 2]);
    assert_eq!(clamped.page_count(), 1);
    assert_eq!(store.snapshot().page_index(), 0);
    assert_eq!(store.row_count(), Some(3));
    assert!(!store.next_page().unwrap());
  }

  #[tokio::test]
  async fn test_controller_stops_when_handles_are_dropped() {
    let h = start(12);
    let mut rx = h.rx;
    drop(h.handle);

    let stopped = tokio::time::timeout(Duration::from_secs(2), async {
      while rx.changed().await.is_ok() {}
    })
    .await;
    assert!(stopped.is_ok());
  }
}
