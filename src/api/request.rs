//! Translate a view-state into the outbound collection request.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use url::Url;

use crate::error::FetchError;
use crate::view::ViewState;

/// Query parameters owned by the translator. Any existing values for these
/// names on the endpoint are replaced.
const PARAMS: [&str; 5] = ["offset", "limit", "filters", "global_filter", "sorting"];

/// A fully built GET request, ready for the transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
  pub url: Url,
  pub headers: HeaderMap,
}

/// Build the request for `view` against `endpoint`.
///
/// `offset` is always `page_index * page_size`. `filters` and `sorting` go out
/// as JSON arrays and `global_filter` is sent even when empty. A missing
/// credential still yields a request, without an `Authorization` header; the
/// backend decides what that means.
pub fn build_request(
  endpoint: &Url,
  credential: Option<&str>,
  view: &ViewState,
) -> Result<OutboundRequest, FetchError> {
  let filters = serde_json::to_string(&view.filters)
    .map_err(|e| FetchError::InvalidRequest(format!("filters: {}", e)))?;
  let sorting = serde_json::to_string(&view.sorting)
    .map_err(|e| FetchError::InvalidRequest(format!("sorting: {}", e)))?;

  let mut url = endpoint.clone();
  let retained: Vec<(String, String)> = endpoint
    .query_pairs()
    .filter(|(name, _)| !PARAMS.iter().any(|owned| name == owned))
    .map(|(name, value)| (name.into_owned(), value.into_owned()))
    .collect();

  {
    let mut query = url.query_pairs_mut();
    query.clear();
    for (name, value) in &retained {
      query.append_pair(name, value);
    }
    query
      .append_pair("offset", &view.pagination.offset().to_string())
      .append_pair("limit", &view.pagination.limit().to_string())
      .append_pair("filters", &filters)
      .append_pair("global_filter", &view.global_filter)
      .append_pair("sorting", &sorting);
  }

  let mut headers = HeaderMap::new();
  headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
  if let Some(token) = credential {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|e| FetchError::InvalidRequest(format!("credential: {}", e)))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
  }

  Ok(OutboundRequest { url, headers })
}
