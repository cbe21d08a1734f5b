pub mod cron;
pub mod server;
pub mod telegram;

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::state::AppState;

#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }

  /// Runs until `shutdown` is cancelled; returning early means a crash
  async fn start(
    &self,
    app: Arc<AppState>,
    shutdown: CancellationToken,
  ) -> anyhow::Result<()>;
}

pub struct App {
  plugins: Vec<Arc<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self { plugins: Vec::new() }
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Arc::new(plugin));
    self
  }

  /// Supervises every plugin, restarting crashed ones until shutdown
  pub async fn run(self, app: Arc<AppState>, shutdown: CancellationToken) {
    let mut set = JoinSet::new();

    for plugin in self.plugins {
      let app = app.clone();
      let shutdown = shutdown.clone();

      set.spawn(async move {
        let name = plugin.name();
        info!("SYSTEM: Service `{name}` initialized");

        loop {
          let handle = tokio::spawn({
            let app = app.clone();
            let plugin = plugin.clone();
            let shutdown = shutdown.clone();
            async move { plugin.start(app, shutdown).await }
          });

          match handle.await {
            Ok(Ok(())) if shutdown.is_cancelled() => {
              info!("Service `{name}` shutdown.");
              break;
            }
            Ok(Ok(())) => warn!("Service `{name}` stopped unexpectedly (Ok)."),
            Ok(Err(err)) => {
              error!("Service `{name}` crashed with error: {err:#}.")
            }
            Err(join_err) if join_err.is_cancelled() => {
              info!("Service `{name}` cancelled.");
              break;
            }
            Err(_) => error!("Service `{name}` PANICKED!"),
          }

          tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(Duration::from_secs(5)) => {}
          }
          info!("SYSTEM: Restarting service `{name}`...");
        }
      });
    }

    while set.join_next().await.is_some() {}
  }
}
