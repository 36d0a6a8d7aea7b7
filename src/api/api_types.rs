//! Serde-deserializable types matching the collection endpoint's responses.
//!
//! Kept apart from the domain types so the wire contract can be validated
//! before anything reaches the cache.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::types::Page;
use crate::error::FetchError;

/// `{count, results}` body. Paginator extras like `next`/`previous` are
/// accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct ApiPageResponse<R> {
  pub count: u64,
  pub results: Vec<R>,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub previous: Option<String>,
}

impl<R> ApiPageResponse<R> {
  /// Check the body against the request that produced it.
  pub fn into_page(self, limit: u32) -> Result<Page<R>, FetchError> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    if self.results.len() > limit {
      return Err(FetchError::Malformed(format!(
        "{} results returned for a page of {}",
        self.results.len(),
        limit
      )));
    }
    Ok(Page {
      count: self.count,
      results: self.results,
    })
  }
}

/// Parse and validate a page body.
pub fn parse_page<R: DeserializeOwned>(body: &str, limit: u32) -> Result<Page<R>, FetchError> {
  let response: ApiPageResponse<R> =
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
  response.into_page(limit)
}
