//! Query layer: keys derived from view-state, the controller that drives the
//! cache from view changes, and the result holder behind "keep previous data".

mod controller;
mod holder;
mod key;

pub use controller::{GridController, GridHandle, GridSnapshot};
pub use holder::ResultHolder;
pub use key::{QueryKey, DEFAULT_SCOPE};

use futures::future::BoxFuture;

use crate::api::Page;
use crate::error::FetchError;
use crate::view::ViewState;

/// Anything that can produce one page of rows for a view-state.
///
/// The returned future must not borrow from `self` or `view`; the cache drives
/// it on its own task so it survives the caller losing interest. The cache
/// calls `fetch_page` without holding its own lock, so a source may read the
/// same `QueryCache`.
pub trait PageSource<R>: Send + Sync + 'static {
  fn fetch_page(&self, view: &ViewState) -> BoxFuture<'static, Result<Page<R>, FetchError>>;
}
