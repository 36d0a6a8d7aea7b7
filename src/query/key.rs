//! Cache identity derived from a view-state.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::view::{ColumnFilter, SortRule, ViewState};

/// Scope used when the caller does not name one.
pub const DEFAULT_SCOPE: &str = "table-data";

/// Canonical serialization of a `ViewState`, used as the cache identity.
///
/// The key is a JSON array `[scope, filters, global_filter, page_index,
/// page_size, sorting]`. Filter and sort order are positional, and empty
/// sequences serialize as `[]` so "no filters" is its own key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

#[derive(Serialize)]
struct KeyParts<'a>(
  &'a str,
  &'a [ColumnFilter],
  &'a str,
  usize,
  u32,
  &'a [SortRule],
);

impl QueryKey {
  pub fn build(view: &ViewState) -> Self {
    Self::scoped(DEFAULT_SCOPE, view)
  }

  /// Build a key under `scope`, so different collections never share entries.
  pub fn scoped(scope: &str, view: &ViewState) -> Self {
    let parts = KeyParts(
      scope,
      &view.filters,
      &view.global_filter,
      view.pagination.page_index,
      view.pagination.page_size,
      &view.sorting,
    );
    // Serializing strings, integers and derived structs into a String cannot
    // fail; the fallback only keeps this function total.
    let canonical = serde_json::to_string(&parts).unwrap_or_else(|_| format!("{:?}", view));
    Self(canonical)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Short stable hash of the key, for log fields.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.0.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..6])
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
