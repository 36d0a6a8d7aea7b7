use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::parse_page;
use super::request::{build_request, OutboundRequest};
use super::types::Page;
use crate::config::Config;
use crate::error::FetchError;
use crate::query::PageSource;
use crate::view::ViewState;

/// HTTP client for one paginated collection endpoint.
///
/// Rows of type `R` are decoded from the `results` array. The bearer token is
/// supplied from outside and can be swapped at any time; it is not part of
/// the cache key.
pub struct ApiClient<R> {
  http: reqwest::Client,
  endpoint: Url,
  credential: Arc<RwLock<Option<String>>>,
  _rows: PhantomData<fn() -> R>,
}

impl<R> Clone for ApiClient<R> {
  fn clone(&self) -> Self {
    Self {
      http: self.http.clone(),
      endpoint: self.endpoint.clone(),
      credential: Arc::clone(&self.credential),
      _rows: PhantomData,
    }
  }
}

impl<R: DeserializeOwned + Send + 'static> ApiClient<R> {
  pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, FetchError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      endpoint,
      credential: Arc::new(RwLock::new(None)),
      _rows: PhantomData,
    })
  }

  /// Client for the endpoint and token described by `config`.
  pub fn from_config(config: &Config) -> Result<Self, FetchError> {
    let endpoint = config
      .endpoint_url()
      .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
    let client = Self::new(endpoint, Duration::from_secs(config.api.timeout_secs))?;
    client.set_credential(Config::get_api_token());
    Ok(client)
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  /// Replace the bearer token used for subsequent requests.
  pub fn set_credential(&self, token: Option<String>) {
    *self
      .credential
      .write()
      .unwrap_or_else(PoisonError::into_inner) = token;
  }

  fn credential(&self) -> Option<String> {
    self
      .credential
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Fetch the page described by `view`.
  pub async fn fetch_page(&self, view: &ViewState) -> Result<Page<R>, FetchError> {
    let credential = self.credential();
    let request = build_request(&self.endpoint, credential.as_deref(), view)?;
    self.send(request, view.pagination.limit()).await
  }

  async fn send(&self, request: OutboundRequest, limit: u32) -> Result<Page<R>, FetchError> {
    debug!(url = %request.url, "GET page");

    let response = self
      .http
      .get(request.url)
      .headers(request.headers)
      .send()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?;

    check_status(response.status())?;

    let body = response
      .text()
      .await
      .map_err(|e| FetchError::Network(format!("failed to read body: {}", e)))?;

    parse_page(&body, limit)
  }
}

impl<R: DeserializeOwned + Send + 'static> PageSource<R> for ApiClient<R> {
  fn fetch_page(&self, view: &ViewState) -> BoxFuture<'static, Result<Page<R>, FetchError>> {
    let client = self.clone();
    let view = view.clone();
    async move { ApiClient::fetch_page(&client, &view).await }.boxed()
  }
}

/// Map a response status to the error taxonomy. 2xx passes.
fn check_status(status: StatusCode) -> Result<(), FetchError> {
  if status.is_success() {
    return Ok(());
  }
  if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
    return Err(FetchError::Unauthorized {
      status: status.as_u16(),
    });
  }
  Err(FetchError::Status {
    status: status.as_u16(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Customer;

  #[test]
  fn test_check_status() {
    assert_eq!(check_status(StatusCode::OK), Ok(()));
    assert_eq!(check_status(StatusCode::NO_CONTENT), Ok(()));
    assert_eq!(
      check_status(StatusCode::UNAUTHORIZED),
      Err(FetchError::Unauthorized { status: 401 })
    );
    assert_eq!(
      check_status(StatusCode::FORBIDDEN),
      Err(FetchError::Unauthorized { status: 403 })
    );
    assert_eq!(
      check_status(StatusCode::BAD_GATEWAY),
      Err(FetchError::Status { status: 502 })
    );
    assert_eq!(
      check_status(StatusCode::NOT_FOUND),
      Err(FetchError::Status { status: 404 })
    );
  }

  #[test]
  fn test_credential_can_be_swapped() {
    let client: ApiClient<Customer> = ApiClient::new(
      Url::parse("http://localhost:5000/customers").unwrap(),
      Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(client.credential(), None);

    let shared = client.clone();
    shared.set_credential(Some("t1".to_string()));
    assert_eq!(client.credential().as_deref(), Some("t1"));
  }

  #[tokio::test]
  async fn test_unreachable_backend_is_network_error() {
    // Port 9 (discard) on localhost is expected to refuse connections.
    let client: ApiClient<Customer> = ApiClient::new(
      Url::parse("http://127.0.0.1:9/customers").unwrap(),
      Duration::from_secs(2),
    )
    .unwrap();
    let result = client.fetch_page(&ViewState::default()).await;
    assert!(matches!(result, Err(FetchError::Network(_))));
  }
}
