use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use rowsync::app::App;
use rowsync::config::Config;
use rowsync::{logging, ApiClient, Customer, GridController, QueryCache, ViewStateStore};

#[derive(Parser, Debug)]
#[command(name = "rowsync")]
#[command(about = "A terminal grid for paginated REST collections")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rowsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend base URL, overrides api.url
  #[arg(short, long)]
  url: Option<String>,

  /// Rows per page, overrides grid.page_size
  #[arg(short, long)]
  page_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override settings given on the command line
  if let Some(url) = args.url {
    config.api.url = url;
  }
  if let Some(page_size) = args.page_size {
    config.grid.page_size = page_size;
  }
  config.validate()?;

  let _log_guard = logging::init(&logging::log_dir())?;
  info!(endpoint = %config.endpoint_url()?, "starting rowsync");

  let client: ApiClient<Customer> = ApiClient::from_config(&config)?;
  let store = ViewStateStore::new(config.initial_view()?)?;
  let cache = QueryCache::new(config.cache_options());
  // One key space per endpoint path
  let scope = client.endpoint().path().to_string();
  let grid = GridController::new(cache, Arc::new(client), store, scope).spawn();

  // Initialize and run the app
  let mut app = App::new(&config, grid)?;
  app.run().await?;

  Ok(())
}
