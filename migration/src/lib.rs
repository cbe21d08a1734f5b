pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_achievements;
mod m20260301_000002_create_users;
mod m20260301_000003_create_user_achievements;
mod m20260301_000004_create_nuts_transactions;
mod m20260301_000005_create_commerce;
mod m20260301_000006_create_promo_codes;
mod m20260301_000007_create_referrals;
mod m20260301_000008_create_log_entries;
mod m20260301_000009_create_game_progress;
mod m20260301_000010_create_idempotency_keys;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260301_000001_create_achievements::Migration),
      Box::new(m20260301_000002_create_users::Migration),
      Box::new(m20260301_000003_create_user_achievements::Migration),
      Box::new(m20260301_000004_create_nuts_transactions::Migration),
      Box::new(m20260301_000005_create_commerce::Migration),
      Box::new(m20260301_000006_create_promo_codes::Migration),
      Box::new(m20260301_000007_create_referrals::Migration),
      Box::new(m20260301_000008_create_log_entries::Migration),
      Box::new(m20260301_000009_create_game_progress::Migration),
      Box::new(m20260301_000010_create_idempotency_keys::Migration),
    ]
  }
}
