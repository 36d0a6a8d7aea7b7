//! Cache entry types and lookup results.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::FetchError;
use crate::query::QueryKey;

/// Lifecycle status of a single cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
  /// Known key, never fetched (e.g. only observed so far)
  #[default]
  Idle,
  /// A fetch for this key is in flight
  Loading,
  /// The last fetch succeeded
  Success,
  /// The last fetch failed; earlier data, if any, is kept
  Error,
}

impl FetchStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, FetchStatus::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, FetchStatus::Error)
  }
}

/// Snapshot of what the cache holds for one key.
#[derive(Debug)]
pub struct CacheEntry<T> {
  pub key: QueryKey,
  /// Latest successful value. Survives later failures.
  pub data: Option<Arc<T>>,
  pub status: FetchStatus,
  /// When `data` was fetched
  pub fetched_at: Option<DateTime<Utc>>,
  /// Error from the most recent failed fetch, cleared on success
  pub error: Option<FetchError>,
}

impl<T> Clone for CacheEntry<T> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      data: self.data.clone(),
      status: self.status,
      fetched_at: self.fetched_at,
      error: self.error.clone(),
    }
  }
}

impl<T> CacheEntry<T> {
  pub(crate) fn new(key: QueryKey) -> Self {
    Self {
      key,
      data: None,
      status: FetchStatus::Idle,
      fetched_at: None,
      error: None,
    }
  }
}

pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>, FetchError>>>;

/// Handle on an in-flight fetch. Every caller that asked for the same key
/// while it was outstanding holds a clone of the same underlying request.
pub struct PendingFetch<T> {
  key: QueryKey,
  cached: Option<Arc<T>>,
  shared: SharedFetch<T>,
}

impl<T> PendingFetch<T> {
  pub(crate) fn new(key: QueryKey, cached: Option<Arc<T>>, shared: SharedFetch<T>) -> Self {
    Self {
      key,
      cached,
      shared,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Data already cached for this key (stale, or about to be refreshed).
  pub fn cached(&self) -> Option<&Arc<T>> {
    self.cached.as_ref()
  }
}

impl<T> Future for PendingFetch<T> {
  type Output = Result<Arc<T>, FetchError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.shared).poll(cx)
  }
}

impl<T> std::fmt::Debug for PendingFetch<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PendingFetch")
      .field("key", &self.key)
      .field("has_cached", &self.cached.is_some())
      .finish_non_exhaustive()
  }
}

/// Outcome of asking the cache for a key.
#[derive(Debug)]
pub enum Lookup<T> {
  /// Fresh data served from cache; no network call was issued.
  Fresh(Arc<T>),
  /// A fetch is in flight (new or joined).
  Pending(PendingFetch<T>),
}
