use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheOptions;
use crate::view::{ViewState, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Custom title for header (defaults to the endpoint if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub grid: GridConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. http://localhost:5000
  pub url: String,
  /// Collection path relative to `url`
  pub endpoint: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:5000".to_string(),
      endpoint: "/customers".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
  pub page_size: u32,
  /// How long a fetched page is served without a refetch
  pub stale_time_secs: u64,
  /// How long an unobserved page stays cached
  pub gc_time_secs: u64,
}

impl Default for GridConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      stale_time_secs: 60,
      gc_time_secs: 300,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rowsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rowsync/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rowsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rowsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.grid.page_size == 0 {
      return Err(eyre!("grid.page_size must be at least 1"));
    }
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be at least 1"));
    }
    self.endpoint_url()?;
    Ok(())
  }

  /// Full URL of the collection endpoint.
  pub fn endpoint_url(&self) -> Result<Url> {
    let base = Url::parse(&self.api.url)
      .map_err(|e| eyre!("Invalid api.url {:?}: {}", self.api.url, e))?;
    if self.api.endpoint.is_empty() {
      return Ok(base);
    }
    base
      .join(&self.api.endpoint)
      .map_err(|e| eyre!("Invalid api.endpoint {:?}: {}", self.api.endpoint, e))
  }

  pub fn cache_options(&self) -> CacheOptions {
    CacheOptions::default()
      .with_stale_time(Duration::seconds(secs_i64(self.grid.stale_time_secs)))
      .with_gc_time(Duration::seconds(secs_i64(self.grid.gc_time_secs)))
  }

  /// View-state the grid starts from.
  pub fn initial_view(&self) -> Result<ViewState> {
    ViewState::with_page_size(self.grid.page_size).map_err(|e| eyre!("Invalid grid config: {}", e))
  }

  /// Header title, falling back to the endpoint path.
  pub fn display_title(&self) -> String {
    self
      .title
      .clone()
      .unwrap_or_else(|| self.api.endpoint.trim_start_matches('/').to_string())
  }

  /// Get the bearer token from environment variables.
  ///
  /// Checks ROWSYNC_TOKEN first, then API_TOKEN as fallback. A missing token
  /// is not an error; requests are then sent without credentials.
  pub fn get_api_token() -> Option<String> {
    std::env::var("ROWSYNC_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .ok()
      .filter(|token| !token.is_empty())
  }
}

fn secs_i64(secs: u64) -> i64 {
  i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)
}
