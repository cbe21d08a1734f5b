use json::Value;

use crate::{entity::log_entry, prelude::*};

pub mod event {
  pub const ACHIEVEMENT_GRANTED: &str = "achievement_granted";
  pub const USER_MESSAGE_SEEN: &str = "user_message_seen";
  pub const PROFILE_PHRASE_CHECK: &str = "profile_phrase_check";
  pub const ROBLOX_VERIFIED: &str = "roblox_verified";
  pub const REFERRAL_BONUS_GRANTED: &str = "referral_bonus_granted";
  pub const REFERRAL_BONUS_PAID: &str = "referral_bonus_paid";
  pub const PAYMENT_COMPLETED: &str = "payment_completed";
  pub const PURCHASE_COMPLETED: &str = "purchase_completed";
  pub const PROMO_REDEEMED: &str = "promo_redeemed";
  pub const GAME_GRANT: &str = "game_grant";
  pub const ADMIN_ACTION: &str = "admin_action";
}

pub struct Log<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Log<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn write(
    &self,
    user_id: Option<i32>,
    event_type: &str,
    message: Option<String>,
    data: Option<Value>,
  ) -> Result<log_entry::Model> {
    let entry = log_entry::ActiveModel {
      user_id: Set(user_id),
      event_type: Set(event_type.to_string()),
      message: Set(message),
      data: Set(data),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    };

    Ok(entry.insert(self.db).await?)
  }

  pub async fn exists(&self, user_id: i32, event_type: &str) -> Result<bool> {
    let count = log_entry::Entity::find()
      .filter(log_entry::Column::UserId.eq(user_id))
      .filter(log_entry::Column::EventType.eq(event_type))
      .count(self.db)
      .await?;
    Ok(count > 0)
  }

  pub async fn count(&self, user_id: i32, event_type: &str) -> Result<u64> {
    let count = log_entry::Entity::find()
      .filter(log_entry::Column::UserId.eq(user_id))
      .filter(log_entry::Column::EventType.eq(event_type))
      .count(self.db)
      .await?;
    Ok(count)
  }

  pub async fn recent(
    &self,
    user_id: Option<i32>,
    limit: u64,
  ) -> Result<Vec<log_entry::Model>> {
    let mut query = log_entry::Entity::find();
    if let Some(user_id) = user_id {
      query = query.filter(log_entry::Column::UserId.eq(user_id));
    }

    let entries = query
      .order_by_desc(log_entry::Column::Id)
      .limit(limit)
      .all(self.db)
      .await?;
    Ok(entries)
  }

  /// Distinct UTC days on which the event was logged, newest first
  pub async fn days(
    &self,
    user_id: i32,
    event_type: &str,
  ) -> Result<Vec<NaiveDate>> {
    let stamps: Vec<DateTime> = log_entry::Entity::find()
      .select_only()
      .column(log_entry::Column::CreatedAt)
      .filter(log_entry::Column::UserId.eq(user_id))
      .filter(log_entry::Column::EventType.eq(event_type))
      .order_by_desc(log_entry::Column::CreatedAt)
      .into_tuple()
      .all(self.db)
      .await?;

    let mut days: Vec<NaiveDate> =
      stamps.into_iter().map(|at| at.date()).collect();
    days.dedup();
    Ok(days)
  }
}
