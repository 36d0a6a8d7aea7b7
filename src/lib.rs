//! rowsync: a terminal grid over a paginated REST collection.
//!
//! The grid's view-state (filters, search, sorting, pagination) lives in a
//! `ViewStateStore`. Every change is turned into a `QueryKey` and served by a
//! `QueryCache` that coalesces identical fetches, serves fresh results without
//! a network call and keeps the previous page visible while the next one
//! loads.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod query;
pub mod ui;
pub mod view;

pub use api::{ApiClient, Customer, Page};
pub use cache::{CacheOptions, FetchStatus, QueryCache};
pub use error::{FetchError, ViewStateError};
pub use query::{GridController, GridHandle, GridSnapshot, PageSource, QueryKey};
pub use view::{ViewState, ViewStateStore};
