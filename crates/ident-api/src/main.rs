//! ident-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `IDENT_*` environment variables, opens the SQLite store and serves the
//! identity API over HTTP.
//!
//! # Auditing a store
//!
//! ```text
//! ident-server --audit
//! ```
//!
//! checks every identity group in the store and exits non-zero if any is
//! malformed.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use ident_api::{AppState, ServerConfig};
use ident_core::{audit::verify_graph, resolver::Resolver, store::ContactStore as _};
use ident_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Ident contact reconciliation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Verify the identity graph in the store and exit.
  #[arg(long)]
  audit: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("IDENT"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Initialise tracing; RUST_LOG overrides the configured level.
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&server_cfg.log_level))
    .context("invalid log_level")?;
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if cli.audit {
    let contacts = store.list_contacts().await.context("failed to read contacts")?;
    let report = verify_graph(&contacts).context("identity graph is corrupt")?;
    tracing::info!(
      contacts = report.contacts,
      groups = report.groups,
      deleted = report.deleted,
      "identity graph is consistent"
    );
    return Ok(());
  }

  let resolver = Resolver::new(Arc::new(store), server_cfg.resolver_config());
  let app = ident_api::router(AppState::new(resolver));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
