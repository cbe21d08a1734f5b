//! Achievement evaluation.
//!
//! The owned set is read once per call, so repeated sequential calls never
//! grant twice. Concurrent calls may both see an achievement as missing; the
//! `(user_id, achievement_id)` primary key rejects the second insert and that
//! grant is dropped.

use std::collections::HashSet;

use json::{Value, json};
use unicode_normalization::UnicodeNormalization;

use crate::{
  entity::{
    Condition, NutsSource, PaymentStatus, PurchaseStatus, achievement, payment,
    promo_redemption, purchase, user, user_achievement,
  },
  prelude::*,
  sv::{self, UserRef, log::event, nuts::Entry},
};

/// What caused an evaluation, recorded on every grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  Payment,
  Purchase,
  Promocode,
  Referral,
  Verified,
  Message,
  SecretWord,
  GameProgress,
  GameGrant,
  Periodic,
  Manual,
}

impl Trigger {
  pub fn as_str(&self) -> &'static str {
    match self {
      Trigger::Payment => "payment",
      Trigger::Purchase => "purchase",
      Trigger::Promocode => "promocode",
      Trigger::Referral => "referral",
      Trigger::Verified => "verified",
      Trigger::Message => "message",
      Trigger::SecretWord => "secret_word",
      Trigger::GameProgress => "game_progress",
      Trigger::GameGrant => "game_grant",
      Trigger::Periodic => "periodic",
      Trigger::Manual => "manual",
    }
  }
}

#[derive(Debug, Clone)]
pub struct Grant {
  pub achievement: achievement::Model,
  pub observed: Option<i64>,
}

impl Grant {
  pub fn reward(&self) -> i64 {
    self.achievement.reward
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outcome {
  satisfied: bool,
  observed: Option<i64>,
}

impl Outcome {
  const NO: Outcome = Outcome { satisfied: false, observed: None };

  fn at_least(observed: i64, threshold: i64) -> Self {
    Self { satisfied: observed >= threshold, observed: Some(observed) }
  }

  fn exists(count: u64) -> Self {
    Self { satisfied: count > 0, observed: Some(count as i64) }
  }
}

#[derive(Debug, Clone, Default)]
pub struct NewAchievement {
  pub name: String,
  pub description: Option<String>,
  pub reward: i64,
  pub condition_type: String,
  pub condition_value: Option<String>,
  pub condition_threshold: Option<i64>,
  pub is_visible: bool,
  pub manual_grant_only: bool,
}

impl NewAchievement {
  pub fn new(
    name: impl Into<String>,
    reward: i64,
    condition_type: impl Into<String>,
  ) -> Self {
    Self {
      name: name.into(),
      reward,
      condition_type: condition_type.into(),
      is_visible: true,
      ..Default::default()
    }
  }

  pub fn threshold(mut self, threshold: i64) -> Self {
    self.condition_threshold = Some(threshold);
    self
  }

  pub fn value(mut self, value: impl Into<String>) -> Self {
    self.condition_value = Some(value.into());
    self
  }

  pub fn manual(mut self) -> Self {
    self.manual_grant_only = true;
    self
  }
}

#[derive(Debug, Default)]
pub struct RecalcReport {
  pub users: u64,
  pub failed: u64,
  /// Telegram id of the receiver with the grant
  pub grants: Vec<(i64, Grant)>,
}

pub struct Achievement<'a, C> {
  db: &'a C,
}

impl<'a, C> Achievement<'a, C>
where
  C: ConnectionTrait + TransactionTrait,
{
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn create(
    &self,
    new: NewAchievement,
  ) -> Result<achievement::Model> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
      return Err(Error::InvalidArgs("achievement name is empty".into()));
    }

    let model = achievement::ActiveModel {
      name: Set(name.clone()),
      description: Set(new.description),
      reward: Set(new.reward),
      condition_type: Set(new.condition_type),
      condition_value: Set(new.condition_value),
      condition_threshold: Set(new.condition_threshold),
      is_visible: Set(new.is_visible),
      manual_grant_only: Set(new.manual_grant_only),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    };

    match model.insert(self.db).await {
      Ok(achievement) => Ok(achievement),
      Err(err) if sv::is_unique_violation(&err) => {
        Err(Error::InvalidArgs(format!("achievement {name} already exists")))
      }
      Err(err) => Err(err.into()),
    }
  }

  pub async fn catalog(
    &self,
    visible_only: bool,
  ) -> Result<Vec<achievement::Model>> {
    let mut query = achievement::Entity::find();
    if visible_only {
      query = query.filter(achievement::Column::IsVisible.eq(true));
    }
    Ok(query.order_by_asc(achievement::Column::Id).all(self.db).await?)
  }

  pub async fn owned(
    &self,
    user_id: i32,
  ) -> Result<Vec<(user_achievement::Model, achievement::Model)>> {
    let rows = user_achievement::Entity::find()
      .filter(user_achievement::Column::UserId.eq(user_id))
      .order_by_asc(user_achievement::Column::EarnedAt)
      .find_also_related(achievement::Entity)
      .all(self.db)
      .await?;

    Ok(
      rows
        .into_iter()
        .filter_map(|(owned, achievement)| Some((owned, achievement?)))
        .collect(),
    )
  }

  async fn owned_ids(&self, user_id: i32) -> Result<HashSet<i32>> {
    let ids: Vec<i32> = user_achievement::Entity::find()
      .select_only()
      .column(user_achievement::Column::AchievementId)
      .filter(user_achievement::Column::UserId.eq(user_id))
      .into_tuple()
      .all(self.db)
      .await?;
    Ok(ids.into_iter().collect())
  }

  /// Sets the badge shown on the profile; `None` clears it
  pub async fn select(
    &self,
    user_id: i32,
    achievement_id: Option<i32>,
  ) -> Result<user::Model> {
    let user = sv::User::new(self.db)
      .by_id(user_id)
      .await?
      .ok_or(Error::UserNotFound)?;

    if let Some(id) = achievement_id
      && !self.owned_ids(user_id).await?.contains(&id)
    {
      return Err(Error::AchievementNotOwned);
    }

    let user = user::ActiveModel {
      selected_achievement_id: Set(achievement_id),
      updated_at: Set(Utc::now().naive_utc()),
      ..user.into()
    }
    .update(self.db)
    .await?;

    Ok(user)
  }

  pub async fn evaluate_and_grant(
    &self,
    user_id: i32,
    trigger: Trigger,
    payload: Option<&Value>,
  ) -> Result<Vec<Grant>> {
    let owned = self.owned_ids(user_id).await?;
    let catalog = self.catalog(false).await?;
    let mut grants = Vec::new();

    for achievement in catalog {
      if owned.contains(&achievement.id) || achievement.manual_grant_only {
        continue;
      }

      let Some(condition) = achievement.condition() else {
        warn!(
          "Achievement #{} `{}` has malformed condition `{}`, skipped",
          achievement.id, achievement.name, achievement.condition_type
        );
        continue;
      };

      let outcome = self.check(user_id, &condition).await?;
      if !outcome.satisfied {
        continue;
      }

      let observed = outcome.observed;
      if let Some(grant) = self
        .grant(user_id, achievement, &condition, trigger, observed, payload)
        .await?
      {
        grants.push(grant);
      }
    }

    Ok(grants)
  }

  /// Matches a chat message against every secret word achievement
  pub async fn grant_secret_word(
    &self,
    user_id: i32,
    text: &str,
  ) -> Result<Vec<Grant>> {
    let said = normalize_word(text);
    if said.is_empty() {
      return Ok(Vec::new());
    }

    let owned = self.owned_ids(user_id).await?;
    let candidates = achievement::Entity::find()
      .filter(achievement::Column::ManualGrantOnly.eq(false))
      .order_by_asc(achievement::Column::Id)
      .all(self.db)
      .await?;

    let mut grants = Vec::new();
    for achievement in candidates {
      if owned.contains(&achievement.id) {
        continue;
      }

      let Some(Condition::SecretWord(word)) = achievement.condition() else {
        continue;
      };

      if normalize_word(&word) != said {
        continue;
      }
      let condition = Condition::SecretWord(word);

      let trigger = Trigger::SecretWord;
      if let Some(grant) = self
        .grant(user_id, achievement, &condition, trigger, None, None)
        .await?
      {
        grants.push(grant);
      }
    }

    Ok(grants)
  }

  /// Admin grant, bypasses the condition and `manual_grant_only`
  pub async fn grant_manual(
    &self,
    user_id: i32,
    achievement_id: i32,
  ) -> Result<Option<Grant>> {
    let achievement = achievement::Entity::find_by_id(achievement_id)
      .one(self.db)
      .await?
      .ok_or(Error::AchievementNotFound)?;

    if self.owned_ids(user_id).await?.contains(&achievement.id) {
      return Ok(None);
    }

    let condition = achievement.condition().unwrap_or(Condition::None);
    self
      .grant(user_id, achievement, &condition, Trigger::Manual, None, None)
      .await
  }

  async fn check(
    &self,
    user_id: i32,
    condition: &Condition,
  ) -> Result<Outcome> {
    let outcome = match condition {
      Condition::None => Outcome { satisfied: true, observed: None },
      Condition::BalanceAtLeast(threshold) => {
        Outcome::at_least(self.user(user_id).await?.balance, *threshold)
      }
      Condition::NutsAtLeast(threshold) => {
        Outcome::at_least(self.user(user_id).await?.nuts_balance, *threshold)
      }
      Condition::ProductPurchase(product_id) => {
        let mut query = completed_purchases(user_id);
        if let Some(product_id) = product_id {
          query = query.filter(purchase::Column::ProductId.eq(*product_id));
        }
        Outcome::exists(query.count(self.db).await?)
      }
      Condition::PurchaseCountAtLeast(threshold) => {
        let count = completed_purchases(user_id).count(self.db).await?;
        Outcome::at_least(count as i64, *threshold)
      }
      Condition::PaymentsSumAtLeast(threshold) => {
        let query = payment::Entity::find()
          .filter(payment::Column::UserId.eq(user_id))
          .filter(payment::Column::Status.eq(PaymentStatus::Completed));
        let total = sv::sum(self.db, query, payment::Column::Amount).await?;
        Outcome::at_least(total, *threshold)
      }
      Condition::ReferralCountAtLeast(threshold) => {
        let count = sv::Referral::new(self.db).count_confirmed(user_id).await?;
        Outcome::at_least(count as i64, *threshold)
      }
      Condition::TimeInGameAtLeast(threshold) => {
        let Some(roblox_id) = self.user(user_id).await?.roblox_id else {
          return Ok(Outcome::NO);
        };
        match sv::Game::new(self.db).playtime(roblox_id).await? {
          Some(playtime) => Outcome::at_least(playtime, *threshold),
          None => Outcome::NO,
        }
      }
      Condition::SpentSumAtLeast(threshold) => {
        let spent = sv::Nuts::new(self.db).spent(user_id).await?;
        Outcome::at_least(spent, *threshold)
      }
      Condition::PromocodeRedemptionCountAtLeast(threshold) => {
        let count = promo_redemption::Entity::find()
          .filter(promo_redemption::Column::UserId.eq(user_id))
          .count(self.db)
          .await?;
        Outcome::at_least(count as i64, *threshold)
      }
      Condition::FirstMessageSent => {
        let count =
          sv::Log::new(self.db).count(user_id, event::USER_MESSAGE_SEEN).await?;
        Outcome::exists(count)
      }
      Condition::ProfilePhraseStreak(threshold) => {
        let days = sv::Log::new(self.db)
          .days(user_id, event::PROFILE_PHRASE_CHECK)
          .await?;
        let today = Utc::now().date_naive();
        Outcome::at_least(streak(&days, today), *threshold)
      }
      // matched against chat messages in `grant_secret_word`
      Condition::SecretWord(_) => Outcome::NO,
    };

    Ok(outcome)
  }

  async fn grant(
    &self,
    user_id: i32,
    achievement: achievement::Model,
    condition: &Condition,
    trigger: Trigger,
    observed: Option<i64>,
    payload: Option<&Value>,
  ) -> Result<Option<Grant>> {
    let txn = self.db.begin().await?;

    let meta = json!({
      "trigger": trigger.as_str(),
      "condition": condition.kind().as_str(),
      "observed": observed,
      "threshold": condition.threshold(),
      "payload": payload,
    });

    let inserted = user_achievement::ActiveModel {
      user_id: Set(user_id),
      achievement_id: Set(achievement.id),
      earned_at: Set(Utc::now().naive_utc()),
      meta: Set(Some(meta.clone())),
    }
    .insert(&txn)
    .await;

    match inserted {
      Ok(_) => {}
      Err(err) if sv::is_unique_violation(&err) => {
        debug!(
          "Achievement #{} already granted to user {user_id} concurrently",
          achievement.id
        );
        txn.rollback().await?;
        return Ok(None);
      }
      Err(err) => return Err(err.into()),
    }

    if achievement.reward > 0 {
      sv::Nuts::new(&txn)
        .add_nuts(
          UserRef::Id(user_id),
          achievement.reward,
          Entry::new(NutsSource::Achievement)
            .reason(format!("Achievement: {}", achievement.name))
            .meta(json!({ "achievement_id": achievement.id })),
        )
        .await?;
    }

    sv::Log::new(&txn)
      .write(
        Some(user_id),
        event::ACHIEVEMENT_GRANTED,
        Some(format!("Achievement `{}` granted", achievement.name)),
        Some(json!({
          "achievement_id": achievement.id,
          "name": achievement.name,
          "reward": achievement.reward,
          "meta": meta,
        })),
      )
      .await?;

    txn.commit().await?;

    info!(
      "Granted achievement `{}` to user {user_id} ({})",
      achievement.name,
      trigger.as_str()
    );
    Ok(Some(Grant { achievement, observed }))
  }

  async fn user(&self, user_id: i32) -> Result<user::Model> {
    sv::User::new(self.db).by_id(user_id).await?.ok_or(Error::UserNotFound)
  }

  /// Re-evaluates every active user, one transaction per user
  pub async fn recalculate_all(&self, page_size: u64) -> Result<RecalcReport> {
    let mut report = RecalcReport::default();

    let mut pages = user::Entity::find()
      .select_only()
      .column(user::Column::Id)
      .column(user::Column::TgUserId)
      .filter(user::Column::IsBlocked.eq(false))
      .order_by_asc(user::Column::Id)
      .into_tuple::<(i32, i64)>()
      .paginate(self.db, page_size.max(1));

    while let Some(page) = pages.fetch_and_next().await? {
      for (user_id, tg_user_id) in page {
        report.users += 1;

        let txn = self.db.begin().await?;
        match Achievement::new(&txn)
          .evaluate_and_grant(user_id, Trigger::Periodic, None)
          .await
        {
          Ok(grants) => {
            txn.commit().await?;
            report.grants.extend(grants.into_iter().map(|g| (tg_user_id, g)));
          }
          Err(err) => {
            report.failed += 1;
            warn!("Recalculation failed for user {user_id}: {err}");
            txn.rollback().await?;
          }
        }
      }
    }

    Ok(report)
  }
}

fn completed_purchases(user_id: i32) -> sea_orm::Select<purchase::Entity> {
  purchase::Entity::find()
    .filter(purchase::Column::UserId.eq(user_id))
    .filter(purchase::Column::Status.eq(PurchaseStatus::Completed))
}

/// Compatibility-normalized, lowercased, single-spaced
pub fn normalize_word(text: &str) -> String {
  let text: String = text.nfkc().collect();
  text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Length of the run of consecutive days ending today or yesterday.
/// `days` must be sorted newest first without duplicates.
pub fn streak(days: &[NaiveDate], today: NaiveDate) -> i64 {
  let Some((&latest, rest)) = days.split_first() else {
    return 0;
  };

  if latest != today && Some(latest) != today.pred_opt() {
    return 0;
  }

  let mut count = 1;
  let mut prev = latest;
  for &day in rest {
    if Some(day) != prev.pred_opt() {
      break;
    }
    count += 1;
    prev = day;
  }
  count
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{entity::log_entry, testing};

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn test_streak_counts_consecutive_days() {
    let today = day(2026, 3, 10);
    let days =
      [day(2026, 3, 10), day(2026, 3, 9), day(2026, 3, 8), day(2026, 3, 6)];
    assert_eq!(streak(&days, today), 3);

    // a streak still counts until the day is over
    let days = [day(2026, 3, 9), day(2026, 3, 8)];
    assert_eq!(streak(&days, today), 2);

    let days = [day(2026, 3, 7), day(2026, 3, 6)];
    assert_eq!(streak(&days, today), 0);
    assert_eq!(streak(&[], today), 0);
  }

  #[test]
  fn test_normalize_word_folds_width_and_case() {
    assert_eq!(normalize_word("  ＡＣＯＲＮ  "), "acorn");
    assert_eq!(normalize_word("Golden\u{00A0}Nut"), "golden nut");
    assert_eq!(normalize_word("Орех"), "орех");
  }

  #[tokio::test]
  async fn test_rich_granted_once_after_balance_top_up() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    sv::User::new(&db).add_balance(user.id, 50).await.unwrap();

    let sv = Achievement::new(&db);
    let rich =
      NewAchievement::new("Rich", 25, "balance_at_least").threshold(100);
    let rich = sv.create(rich).await.unwrap();

    let grants =
      sv.evaluate_and_grant(user.id, Trigger::Payment, None).await.unwrap();
    assert!(grants.is_empty());

    sv::User::new(&db).add_balance(user.id, 60).await.unwrap();
    let grants =
      sv.evaluate_and_grant(user.id, Trigger::Payment, None).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].achievement.id, rich.id);
    assert_eq!(grants[0].observed, Some(110));

    let again =
      sv.evaluate_and_grant(user.id, Trigger::Payment, None).await.unwrap();
    assert!(again.is_empty());

    let user = testing::reload(&db, user.id).await;
    assert_eq!(user.nuts_balance, 25);

    let logs = log_entry::Entity::find()
      .filter(log_entry::Column::EventType.eq(event::ACHIEVEMENT_GRANTED))
      .all(&db)
      .await
      .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(sv.owned(user.id).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_grant_meta_records_trigger() {
    let db = testing::db().await;
    let user = testing::user_with_nuts(&db, 1, 300).await;
    let sv = Achievement::new(&db);
    let squirrel =
      NewAchievement::new("Squirrel", 0, "nuts_at_least").threshold(250);
    sv.create(squirrel).await.unwrap();

    let payload = json!({ "source": "test" });
    sv.evaluate_and_grant(user.id, Trigger::GameGrant, Some(&payload))
      .await
      .unwrap();

    let (owned, _) = sv.owned(user.id).await.unwrap().remove(0);
    let meta = owned.meta.unwrap();
    assert_eq!(meta["trigger"], "game_grant");
    assert_eq!(meta["observed"], 300);
    assert_eq!(meta["threshold"], 250);
    assert_eq!(meta["payload"]["source"], "test");

    // zero reward must not touch the ledger
    let user = testing::reload(&db, user.id).await;
    assert_eq!(user.nuts_balance, 300);
  }

  #[tokio::test]
  async fn test_malformed_and_manual_achievements_are_skipped() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);

    let broken = NewAchievement::new("Broken", 10, "moon_phase").threshold(1);
    sv.create(broken).await.unwrap();
    let unbounded = NewAchievement::new("No threshold", 10, "nuts_at_least");
    sv.create(unbounded).await.unwrap();
    sv.create(NewAchievement::new("Staff", 10, "none").manual()).await.unwrap();
    let hello = NewAchievement::new("Hello", 5, "none");
    let hello = sv.create(hello).await.unwrap();

    let grants =
      sv.evaluate_and_grant(user.id, Trigger::Message, None).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].achievement.id, hello.id);
  }

  #[tokio::test]
  async fn test_manual_grant_bypasses_condition() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);

    let staff = NewAchievement::new("Staff", 10, "none").manual();
    let staff = sv.create(staff).await.unwrap();

    let grant = sv.grant_manual(user.id, staff.id).await.unwrap();
    assert!(grant.is_some());
    assert!(sv.grant_manual(user.id, staff.id).await.unwrap().is_none());
    assert!(matches!(
      sv.grant_manual(user.id, staff.id + 100).await,
      Err(Error::AchievementNotFound)
    ));
  }

  #[tokio::test]
  async fn test_racing_grant_is_dropped() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);
    let hello =
      sv.create(NewAchievement::new("Hello", 5, "none")).await.unwrap();
    let bye = sv.create(NewAchievement::new("Bye", 3, "none")).await.unwrap();
    let (none, manual) = (&Condition::None, Trigger::Manual);

    let first =
      sv.grant(user.id, hello.clone(), none, manual, None, None).await;
    assert!(first.unwrap().is_some());

    // the owned set is bypassed, so the primary key is what rejects these
    let txn = db.begin().await.unwrap();
    let inner = Achievement::new(&txn);
    for _ in 0..2 {
      let again =
        inner.grant(user.id, hello.clone(), none, manual, None, None).await;
      assert!(again.unwrap().is_none());
    }
    let other = inner.grant(user.id, bye, none, manual, None, None).await;
    assert!(other.unwrap().is_some());
    txn.commit().await.unwrap();

    assert_eq!(testing::reload(&db, user.id).await.nuts_balance, 8);
    let granted = sv::Log::new(&db)
      .count(user.id, event::ACHIEVEMENT_GRANTED)
      .await
      .unwrap();
    assert_eq!(granted, 2);
  }

  #[tokio::test]
  async fn test_secret_word() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);

    let secret =
      NewAchievement::new("Whisper", 40, "secret_word").value("Golden Acorn");
    let secret = sv.create(secret).await.unwrap();

    // evaluation never matches secret words by itself
    let grants =
      sv.evaluate_and_grant(user.id, Trigger::Message, None).await.unwrap();
    assert!(grants.is_empty());
    assert!(sv.grant_secret_word(user.id, "golden").await.unwrap().is_empty());

    let grants =
      sv.grant_secret_word(user.id, "  GOLDEN   acorn ").await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].achievement.id, secret.id);
    let again = sv.grant_secret_word(user.id, "golden acorn").await.unwrap();
    assert!(again.is_empty());
  }

  #[tokio::test]
  async fn test_first_message_sent() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);
    let chatty = NewAchievement::new("Chatty", 5, "first_message_sent");
    sv.create(chatty).await.unwrap();

    let grants =
      sv.evaluate_and_grant(user.id, Trigger::Message, None).await.unwrap();
    assert!(grants.is_empty());

    sv::Log::new(&db)
      .write(Some(user.id), event::USER_MESSAGE_SEEN, None, None)
      .await
      .unwrap();
    let grants =
      sv.evaluate_and_grant(user.id, Trigger::Message, None).await.unwrap();
    assert_eq!(grants.len(), 1);
  }

  #[tokio::test]
  async fn test_time_in_game_reads_latest_progress() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);
    let veteran = NewAchievement::new("Veteran", 50, "time_in_game_at_least")
      .threshold(3600);
    sv.create(veteran).await.unwrap();
    let progress = Trigger::GameProgress;

    // not linked to Roblox yet
    let grants = sv.evaluate_and_grant(user.id, progress, None).await.unwrap();
    assert!(grants.is_empty());

    sv::User::new(&db).verify(user.id, 555, "Player".into()).await.unwrap();
    let game = sv::Game::new(&db);
    game.push(555, json!({ "playtime": 4000 })).await.unwrap();
    game.push(555, json!({ "timePlayed": "1200" })).await.unwrap();
    let grants = sv.evaluate_and_grant(user.id, progress, None).await.unwrap();
    assert!(grants.is_empty());

    game.push(555, json!({ "time_in_game": 3600 })).await.unwrap();
    let grants = sv.evaluate_and_grant(user.id, progress, None).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].observed, Some(3600));
  }

  #[tokio::test]
  async fn test_select_requires_ownership() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let sv = Achievement::new(&db);
    let hello =
      sv.create(NewAchievement::new("Hello", 0, "none")).await.unwrap();

    assert!(matches!(
      sv.select(user.id, Some(hello.id)).await,
      Err(Error::AchievementNotOwned)
    ));

    sv.evaluate_and_grant(user.id, Trigger::Manual, None).await.unwrap();
    let user = sv.select(user.id, Some(hello.id)).await.unwrap();
    assert_eq!(user.selected_achievement_id, Some(hello.id));

    let user = sv.select(user.id, None).await.unwrap();
    assert_eq!(user.selected_achievement_id, None);
  }

  #[tokio::test]
  async fn test_recalculate_all_skips_blocked_users() {
    let db = testing::db().await;
    testing::user_with_nuts(&db, 1, 100).await;
    testing::user_with_nuts(&db, 2, 100).await;
    testing::user_with_nuts(&db, 3, 10).await;
    sv::User::new(&db).set_blocked(2, true).await.unwrap();

    let sv = Achievement::new(&db);
    sv.create(NewAchievement::new("Hoarder", 5, "nuts_at_least").threshold(100))
      .await
      .unwrap();

    let report = sv.recalculate_all(1).await.unwrap();
    assert_eq!(report.users, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.grants.len(), 1);
    assert_eq!(report.grants[0].0, 1);

    let again = sv.recalculate_all(100).await.unwrap();
    assert!(again.grants.is_empty());
  }
}
