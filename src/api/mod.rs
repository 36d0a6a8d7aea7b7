//! Transport for the paginated collection endpoint.

mod api_types;
mod client;
mod request;
mod types;

pub use api_types::{parse_page, ApiPageResponse};
pub use client::ApiClient;
pub use request::{build_request, OutboundRequest};
pub use types::{Customer, Device, DeviceCategory, DeviceStatus, Page};
