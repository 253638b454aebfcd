//! consent-engine server binary.
//!
//! Reads `consent-engine.toml` (or the path given with `--config`) plus
//! `CONSENT__…` environment variables, opens the SQLite store, starts the
//! background expiry sweep and serves both route groups over HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use consent_core::{ConsentEngine, guard::OwnerGuard};
use consent_server::{AppState, Settings, directory::Resolver, jwks::JwtVerifier, sweep};
use consent_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Consent lifecycle and access-control service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "consent-engine.toml")]
  config: PathBuf,

  /// Print the effective configuration (secrets masked) and exit.
  #[arg(long)]
  print_config: bool,
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

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

  if cli.print_config {
    println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
    return Ok(());
  }

  tracing::info!(profile = %settings.profile, "starting consent engine");

  let store = SqliteStore::connect(&settings.store)
    .await
    .with_context(|| format!("failed to open store at {}", settings.store.path.display()))?;

  let resolver = Resolver::from_settings(settings.profile, &settings.identity)
    .context("failed to configure identity resolver")?;
  let verifier =
    JwtVerifier::from_settings(&settings.auth).context("failed to configure token verifier")?;
  let guard = OwnerGuard::with_identity_claims(verifier, settings.auth.identity_claims.clone());

  let engine = Arc::new(ConsentEngine::new(store, resolver));
  let _sweeper = sweep::spawn(engine.clone(), settings.sweep_interval_secs);

  let address = settings.bind_address();
  let state = AppState {
    engine,
    guard: Arc::new(guard),
    config: Arc::new(settings),
  };
  let app = consent_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
