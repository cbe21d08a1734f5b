use std::{collections::HashSet, env, str::FromStr};

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub telegram_token: String,
  pub admins: HashSet<i64>,
  pub hmac_secret: String,
  pub idempotency_ttl: Duration,
  pub roblox_api: String,
  /// Nuts per currency unit, recorded on every top-up
  pub nuts_rate: f64,
  pub recalc_interval: Duration,
  pub port: u16,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: String::from("sqlite:nutshop.db?mode=rwc"),
      telegram_token: String::new(),
      admins: HashSet::new(),
      hmac_secret: String::new(),
      idempotency_ttl: Duration::from_secs(24 * 3600),
      roblox_api: String::from("https://users.roblox.com"),
      nuts_rate: 1.0,
      recalc_interval: Duration::from_secs(600),
      port: 3000,
    }
  }
}

fn required(name: &str) -> anyhow::Result<String> {
  env::var(name).with_context(|| format!("{name} not set"))
}

fn optional<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
  T::Err: std::fmt::Display,
{
  match env::var(name) {
    Ok(raw) if !raw.trim().is_empty() => raw
      .trim()
      .parse()
      .map(Some)
      .map_err(|err| anyhow::anyhow!("Invalid {name}: {err}")),
    _ => Ok(None),
  }
}

fn duration(name: &str) -> anyhow::Result<Option<Duration>> {
  match env::var(name) {
    Ok(raw) if !raw.trim().is_empty() => {
      let raw = raw.trim();
      // bare numbers are seconds
      if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Some(Duration::from_secs(secs)));
      }
      humantime::parse_duration(raw)
        .map(Some)
        .with_context(|| format!("Invalid {name} duration"))
    }
    _ => Ok(None),
  }
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let default = Self::default();

    let root_admin: i64 = required("ROOT_ADMIN_ID")?
      .trim()
      .parse()
      .context("Invalid ROOT_ADMIN_ID format")?;

    let mut admins: HashSet<i64> = env::var("ADMIN_IDS")
      .unwrap_or_default()
      .split(',')
      .filter(|s| !s.trim().is_empty())
      .map(|id| id.trim().parse().context("Invalid Admin ID format"))
      .collect::<anyhow::Result<_>>()?;
    admins.insert(root_admin);

    let config = Self {
      database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),
      telegram_token: required("TELEGRAM_TOKEN")?,
      admins,
      hmac_secret: required("BACKEND_HMAC_SECRET")?,
      idempotency_ttl: duration("BACKEND_IDEMPOTENCY_TTL")?
        .unwrap_or(default.idempotency_ttl),
      roblox_api: env::var("ROBLOX_API_BASE_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or(default.roblox_api),
      nuts_rate: optional("NUTS_EXCHANGE_RATE")?.unwrap_or(default.nuts_rate),
      recalc_interval: duration("ACHIEVEMENT_RECALC_INTERVAL")?
        .unwrap_or(default.recalc_interval),
      port: optional("PORT")?.unwrap_or(default.port),
    };
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> anyhow::Result<()> {
    if self.idempotency_ttl.is_zero() {
      anyhow::bail!("BACKEND_IDEMPOTENCY_TTL must be positive");
    }
    if !(self.nuts_rate.is_finite() && self.nuts_rate > 0.0) {
      anyhow::bail!("NUTS_EXCHANGE_RATE must be positive");
    }
    Ok(())
  }

  pub fn is_admin(&self, tg_user_id: i64) -> bool {
    self.admins.contains(&tg_user_id)
  }
}
