//! Palaver server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! SQLite store, and serves the JSON API over HTTP. Environment variables
//! prefixed `PALAVER_` override file settings, e.g.
//! `PALAVER_UPSTREAM_API_KEY`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use palaver_api::{AppState, ServerConfig};
use palaver_store_sqlite::SqliteStore;
use palaver_upstream::{DEFAULT_TIMEOUT, UpstreamClient};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Palaver chat backend server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PALAVER"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // A store that fails to open degrades startup to an error with context,
  // never a panic.
  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", server_cfg.store_path)
    })?;

  let upstream = UpstreamClient::with_endpoint(
    server_cfg.upstream_url.clone(),
    server_cfg.upstream_api_key.clone(),
    DEFAULT_TIMEOUT,
  )
  .context("failed to build upstream client")?;

  let state = AppState {
    store:    Arc::new(store),
    upstream: Arc::new(upstream),
  };

  let app = palaver_api::router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
