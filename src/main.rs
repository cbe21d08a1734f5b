//! Nut Shop - Telegram storefront with a Roblox game backend
//!
//! Architecture:
//! - SeaORM for database access (SQLite or Postgres)
//! - Axum for the signed game and payment API
//! - Teloxide for the Telegram bot with inline keyboards
//! - A plugin supervisor running the server, the bot and periodic jobs

mod config;
mod entity;
mod error;
mod notify;
mod plugins;
mod prelude;
mod roblox;
mod security;
mod state;
mod sv;
#[cfg(test)]
mod testing;
mod utils;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{
  config::Config,
  plugins::{App, cron, server, telegram},
  prelude::*,
  state::AppState,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "nutshop=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  info!("Starting Nut Shop v{}", env!("CARGO_PKG_VERSION"));

  let app = Arc::new(AppState::new(config).await?);

  let shutdown = CancellationToken::new();
  tokio::spawn({
    let shutdown = shutdown.clone();
    async move {
      if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {err}");
        return;
      }
      info!("Shutting down...");
      shutdown.cancel();
    }
  });

  let run = App::new()
    .register(server::Plugin)
    .register(telegram::Plugin)
    .register(cron::Plugin)
    .run(app, shutdown.clone());
  tokio::pin!(run);

  tokio::select! {
    _ = &mut run => {}
    _ = shutdown.cancelled() => {
      if tokio::time::timeout(SHUTDOWN_GRACE, &mut run).await.is_err() {
        warn!("Services did not stop within {}s", SHUTDOWN_GRACE.as_secs());
      }
    }
  }

  Ok(())
}
