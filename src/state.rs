use std::{sync::Arc, time::Instant};

use teloxide::Bot;

use crate::{
  config::Config,
  entity::user,
  notify::Notifier,
  prelude::*,
  roblox::Roblox,
  sv,
};

const LEADERBOARD_TTL: Duration = Duration::from_secs(60);
const CHALLENGE_TTL: Duration = Duration::from_secs(30 * 60);

/// Roblox account a user claimed with `/verify`, awaiting `/check`
#[derive(Debug, Clone)]
pub struct Challenge {
  pub roblox_id: i64,
  pub roblox_username: String,
  pub phrase: String,
  pub issued_at: Instant,
}

pub struct Services<'a> {
  pub user: sv::User<'a, DatabaseConnection>,
  pub nuts: sv::Nuts<'a, DatabaseConnection>,
  pub achievement: sv::Achievement<'a, DatabaseConnection>,
  pub referral: sv::Referral<'a, DatabaseConnection>,
  pub payment: sv::Payment<'a, DatabaseConnection>,
  pub purchase: sv::Purchase<'a, DatabaseConnection>,
  pub product: sv::Product<'a, DatabaseConnection>,
  pub promo: sv::Promo<'a, DatabaseConnection>,
  pub game: sv::Game<'a, DatabaseConnection>,
  pub idempotency: sv::Idempotency<'a, DatabaseConnection>,
  pub log: sv::Log<'a, DatabaseConnection>,
}

pub struct AppState {
  pub db: DatabaseConnection,
  pub bot: Bot,
  pub notifier: Arc<dyn Notifier>,
  pub config: Config,
  pub roblox: Roblox,
  pub challenges: DashMap<i64, Challenge>,
  leaderboard: DashMap<u64, (Instant, Vec<user::Model>)>,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
      .await
      .context("Failed to connect to database")?;

    info!("Running migrations...");
    migration::Migrator::up(&db, None)
      .await
      .context("Failed to run migrations")?;

    let bot = Bot::new(&config.telegram_token);
    let notifier = Arc::new(bot.clone());
    Self::with_parts(db, bot, notifier, config)
  }

  pub fn with_parts(
    db: DatabaseConnection,
    bot: Bot,
    notifier: Arc<dyn Notifier>,
    config: Config,
  ) -> anyhow::Result<Self> {
    Ok(Self {
      roblox: Roblox::new(&config.roblox_api)?,
      db,
      bot,
      notifier,
      config,
      challenges: DashMap::new(),
      leaderboard: DashMap::new(),
    })
  }

  pub fn sv(&self) -> Services<'_> {
    Services {
      user: sv::User::new(&self.db),
      nuts: sv::Nuts::new(&self.db),
      achievement: sv::Achievement::new(&self.db),
      referral: sv::Referral::new(&self.db),
      payment: sv::Payment::new(&self.db),
      purchase: sv::Purchase::new(&self.db),
      product: sv::Product::new(&self.db),
      promo: sv::Promo::new(&self.db),
      game: sv::Game::new(&self.db),
      idempotency: sv::Idempotency::new(&self.db),
      log: sv::Log::new(&self.db),
    }
  }

  pub fn secret(&self) -> &[u8] {
    self.config.hmac_secret.as_bytes()
  }

  /// Top users by nuts, refreshed at most once a minute
  pub async fn leaderboard(&self, limit: u64) -> Result<Vec<user::Model>> {
    if let Some(entry) = self.leaderboard.get(&limit)
      && entry.0.elapsed() < LEADERBOARD_TTL
    {
      return Ok(entry.1.clone());
    }

    let top = self.sv().user.leaderboard(limit).await?;
    self.leaderboard.insert(limit, (Instant::now(), top.clone()));
    Ok(top)
  }

  pub fn challenge(&self, tg_user_id: i64) -> Option<Challenge> {
    self
      .challenges
      .get(&tg_user_id)
      .filter(|challenge| challenge.issued_at.elapsed() < CHALLENGE_TTL)
      .map(|challenge| challenge.clone())
  }

  /// Drops expired in-memory caches
  pub fn gc(&self) {
    self
      .challenges
      .retain(|_, challenge| challenge.issued_at.elapsed() < CHALLENGE_TTL);
    self.leaderboard.retain(|_, (at, _)| at.elapsed() < LEADERBOARD_TTL);
    self.roblox.gc();
  }
}
