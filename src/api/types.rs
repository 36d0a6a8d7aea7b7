use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of a server-side collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<R> {
  /// Total rows matching the filters, across all pages
  pub count: u64,
  pub results: Vec<R>,
}

impl<R> Page<R> {
  pub fn len(&self) -> usize {
    self.results.len()
  }

  pub fn is_empty(&self) -> bool {
    self.results.is_empty()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
  #[serde(rename = "ACTIVE")]
  Active,
  #[serde(rename = "NOT ACTIVE")]
  NotActive,
  #[serde(rename = "DISABLED")]
  Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCategory {
  #[serde(rename = "ROUTER")]
  Router,
  #[serde(rename = "SWITCH")]
  Switch,
  #[serde(rename = "BRIDGE")]
  Bridge,
  #[serde(rename = "REPEATER")]
  Repeater,
  #[serde(rename = "WIRELESS ACCESS POINT")]
  WirelessAccessPoint,
  #[serde(rename = "NETWORK INTERFACE CARD")]
  NetworkInterfaceCard,
  #[serde(rename = "FIREWALL")]
  Firewall,
  #[serde(rename = "HUB")]
  Hub,
  #[serde(rename = "MODEM")]
  Modem,
  #[serde(rename = "GATEWAY")]
  Gateway,
}

/// Network device owned by a customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
  pub device_id: u64,
  pub device_mac_address: String,
  pub device_ip_v4_address: String,
  pub device_category: DeviceCategory,
  pub device_status: DeviceStatus,
  #[serde(deserialize_with = "timestamp::deserialize")]
  pub created_at: DateTime<Utc>,
  #[serde(deserialize_with = "timestamp::deserialize")]
  pub updated_at: DateTime<Utc>,
}

/// Customer row as served by the collection endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
  pub customer_id: u64,
  pub customer_name: String,
  #[serde(default)]
  pub devices: Vec<Device>,
  #[serde(deserialize_with = "timestamp::deserialize")]
  pub created_at: DateTime<Utc>,
  #[serde(deserialize_with = "timestamp::deserialize")]
  pub updated_at: DateTime<Utc>,
}

impl Customer {
  pub fn device_count(&self) -> usize {
    self.devices.len()
  }

  pub fn active_devices(&self) -> usize {
    self
      .devices
      .iter()
      .filter(|d| d.device_status == DeviceStatus::Active)
      .count()
  }
}

/// Backends without timezone support send naive timestamps; those are read
/// as UTC.
mod timestamp {
  use chrono::{DateTime, NaiveDateTime, Utc};
  use serde::{de, Deserialize, Deserializer};

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
  }

  pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
      return Some(ts);
    }
    raw
      .parse::<NaiveDateTime>()
      .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
      .ok()
      .map(|naive| naive.and_utc())
  }
}
