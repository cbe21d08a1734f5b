use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
  notify,
  prelude::*,
  state::AppState,
  sv::achievement::{Grant, RecalcReport},
};

const PAGE_SIZE: u64 = 100;

/// Periodic achievement recalculation and housekeeping
pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(
    &self,
    app: Arc<AppState>,
    shutdown: CancellationToken,
  ) -> anyhow::Result<()> {
    run_periodic_recalculation(app, shutdown).await;
    Ok(())
  }
}

pub async fn run_periodic_recalculation(
  app: Arc<AppState>,
  shutdown: CancellationToken,
) {
  let period = app.config.recalc_interval.max(Duration::from_secs(1));
  let mut ticks = time::interval_at(Instant::now() + period, period);
  ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

  let every = humantime::format_duration(period);
  info!("Recalculating achievements every {every}");

  loop {
    tokio::select! {
      _ = shutdown.cancelled() => break,
      _ = ticks.tick() => {}
    }

    // a failed pass is retried on the next tick
    match recalculate(&app).await {
      Ok(report) => info!(
        "Recalculated {} users: {} grants, {} failed",
        report.users,
        report.grants.len(),
        report.failed
      ),
      Err(err) => error!("Achievement recalculation failed: {err}"),
    }

    match app.sv().idempotency.purge_expired(app.config.idempotency_ttl).await {
      Ok(0) => {}
      Ok(purged) => debug!("Purged {purged} expired idempotency keys"),
      Err(err) => warn!("Failed to purge idempotency keys: {err}"),
    }

    app.gc();
  }
}

/// One recalculation pass, telling every user what they unlocked
pub async fn recalculate(app: &AppState) -> Result<RecalcReport> {
  let report = app.sv().achievement.recalculate_all(PAGE_SIZE).await?;

  let mut by_user: HashMap<i64, Vec<Grant>> = HashMap::new();
  for (tg_user_id, grant) in &report.grants {
    by_user.entry(*tg_user_id).or_default().push(grant.clone());
  }
  for (tg_user_id, grants) in by_user {
    notify::grants(app.notifier.as_ref(), tg_user_id, &grants).await;
  }

  Ok(report)
}
