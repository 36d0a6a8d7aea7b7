//! Error types shared by the controller, the cache engine and the API client.

use thiserror::Error;

/// Why a page could not be fetched.
///
/// Shared fetches fan a single outcome out to every waiting caller, so this
/// type is `Clone` and carries rendered messages instead of source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The outbound request could not be assembled (e.g. a credential that is
  /// not a valid header value).
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// Connection refused, DNS failure, timeout, broken body stream.
  #[error("network error: {0}")]
  Network(String),

  /// 401 or 403 from the backend.
  #[error("not authorized (HTTP {status})")]
  Unauthorized { status: u16 },

  /// Any other non-2xx status.
  #[error("server returned HTTP {status}")]
  Status { status: u16 },

  /// The body was not a `{count, results}` page.
  #[error("malformed response: {0}")]
  Malformed(String),

  /// The fetch task went away without producing a result.
  #[error("fetch was abandoned before completing")]
  Abandoned,
}

impl FetchError {
  /// Whether the backend rejected the credential.
  pub fn is_unauthorized(&self) -> bool {
    matches!(self, FetchError::Unauthorized { .. })
  }
}

/// A view-state mutation that would produce an unusable state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewStateError {
  #[error("page size must be greater than zero")]
  ZeroPageSize,

  #[error("page {page_index} with page size {page_size} is out of addressable range")]
  OffsetOverflow { page_index: usize, page_size: u32 },
}
