mod guard;
mod handlers;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
  Router,
  routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub struct Plugin;

/// Routes with tracing and CORS; rate limiting is layered on in `start`
pub fn router(app: Arc<AppState>) -> Router {
  Router::new()
    .route("/healthz", get(handlers::health))
    .route("/game/progress/push", post(handlers::progress_push))
    .route("/game/progress/pull", post(handlers::progress_pull))
    .route("/game/grant", post(handlers::game_grant))
    .route("/payments/webhook", post(handlers::payment_webhook))
    .layer(
      ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
          .allow_origin(Any)
          .allow_methods(Any)
          .allow_headers(Any),
      ),
    )
    .with_state(app)
}

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(
    &self,
    app: Arc<AppState>,
    shutdown: CancellationToken,
  ) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let limiter = governor_conf.limiter().clone();

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
    let router = router(app)
      .layer(GovernorLayer::new(governor_conf))
      .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP Server listening on {addr}");

    let limiter = async {
      loop {
        time::sleep(Duration::from_secs(60)).await;
        limiter.retain_recent();
      }
    };

    let server = async {
      axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("Axum server error")
    };

    tokio::select! {
      result = server => {
        match &result {
          Ok(_) => info!("Server stopped gracefully"),
          Err(err) => error!("Server stopped with error: {err}"),
        }
        result
      }
      _ = limiter => {
        error!("Rate limiter cleaner stopped unexpectedly!");
        Ok(())
      }
    }
  }
}
