//! Referral bookkeeping and top-up bonuses.
//!
//! A bonus is paid at most once per top-up source: the
//! `(referral_id, source_kind, source_id)` key of `referral_rewards` rejects
//! repeats even when two deliveries race.

use json::{Value, json};

use crate::{
  entity::{
    NutsSource, ReferralStatus, invoice, payment, referral, referral_reward,
  },
  prelude::*,
  sv::{
    self, UserRef,
    achievement::{Grant, Trigger},
    log::event,
    nuts::Entry,
  },
};

pub const REFERRAL_BONUS_PERCENT: i64 = 10;

/// Top-up the bonus is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusSource {
  Payment(i32),
  Invoice(i32),
}

impl BonusSource {
  pub fn kind(&self) -> &'static str {
    match self {
      BonusSource::Payment(_) => "payment",
      BonusSource::Invoice(_) => "invoice",
    }
  }

  pub fn id(&self) -> i32 {
    match *self {
      BonusSource::Payment(id) | BonusSource::Invoice(id) => id,
    }
  }
}

/// Granted bonus, used to notify the referrer once the transaction commits
#[derive(Debug, Clone)]
pub struct Bonus {
  pub referrer_id: i32,
  pub referrer_tg_id: i64,
  pub amount: i64,
  pub referrer_grants: Vec<Grant>,
  pub payer_grants: Vec<Grant>,
}

pub fn bonus_for(nuts_amount: i64) -> i64 {
  nuts_amount.max(0) * REFERRAL_BONUS_PERCENT / 100
}

pub struct Referral<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Referral<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// Records a pending referral.
  /// Returns `None` for unknown, own or repeated codes.
  pub async fn register(
    &self,
    referred_id: i32,
    code: &str,
  ) -> Result<Option<referral::Model>> {
    let users = sv::User::new(self.db);
    let Some(referrer) = users.by_referral_code(code).await? else {
      return Ok(None);
    };

    if referrer.id == referred_id
      || self.of_referred(referred_id).await?.is_some()
    {
      return Ok(None);
    }

    let model = referral::ActiveModel {
      referrer_id: Set(referrer.id),
      referred_id: Set(referred_id),
      status: Set(ReferralStatus::Pending),
      created_at: Set(Utc::now().naive_utc()),
      confirmed_at: Set(None),
      ..Default::default()
    };

    match model.insert(self.db).await {
      Ok(referral) => {
        info!("User {referred_id} referred by {}", referrer.id);
        Ok(Some(referral))
      }
      Err(err) if sv::is_unique_violation(&err) => Ok(None),
      Err(err) => Err(err.into()),
    }
  }

  /// Confirms the pending referral of the user, returning the referrer id
  pub async fn confirm(&self, referred_id: i32) -> Result<Option<i32>> {
    let Some(referral) = self.of_referred(referred_id).await? else {
      return Ok(None);
    };

    if referral.status == ReferralStatus::Confirmed {
      return Ok(Some(referral.referrer_id));
    }

    let referral = referral::ActiveModel {
      status: Set(ReferralStatus::Confirmed),
      confirmed_at: Set(Some(Utc::now().naive_utc())),
      ..referral.into()
    }
    .update(self.db)
    .await?;

    Ok(Some(referral.referrer_id))
  }

  pub async fn of_referred(
    &self,
    referred_id: i32,
  ) -> Result<Option<referral::Model>> {
    let referral = referral::Entity::find()
      .filter(referral::Column::ReferredId.eq(referred_id))
      .one(self.db)
      .await?;
    Ok(referral)
  }

  pub async fn count_confirmed(&self, referrer_id: i32) -> Result<u64> {
    let count = referral::Entity::find()
      .filter(referral::Column::ReferrerId.eq(referrer_id))
      .filter(referral::Column::Status.eq(ReferralStatus::Confirmed))
      .count(self.db)
      .await?;
    Ok(count)
  }

  pub async fn count_pending(&self, referrer_id: i32) -> Result<u64> {
    let count = referral::Entity::find()
      .filter(referral::Column::ReferrerId.eq(referrer_id))
      .filter(referral::Column::Status.eq(ReferralStatus::Pending))
      .count(self.db)
      .await?;
    Ok(count)
  }

  pub async fn earned(&self, referrer_id: i32) -> Result<i64> {
    let query = referral_reward::Entity::find()
      .filter(referral_reward::Column::ReferrerId.eq(referrer_id));
    sv::sum(self.db, query, referral_reward::Column::Amount).await
  }

  async fn append_audit(
    &self,
    source: BonusSource,
    record: Value,
  ) -> Result<()> {
    fn push(meta: Option<Value>, record: Value) -> Value {
      let mut meta = match meta {
        Some(Value::Object(map)) => map,
        _ => Default::default(),
      };
      let list =
        meta.entry("referral_bonus_topups").or_insert_with(|| json!([]));
      match list {
        Value::Array(items) => items.push(record),
        other => *other = json!([record]),
      }
      Value::Object(meta)
    }

    match source {
      BonusSource::Payment(id) => {
        let found = payment::Entity::find_by_id(id).one(self.db).await?;
        if let Some(model) = found {
          let meta = push(model.meta.clone(), record);
          payment::ActiveModel { meta: Set(Some(meta)), ..model.into() }
            .update(self.db)
            .await?;
        }
      }
      BonusSource::Invoice(id) => {
        let found = invoice::Entity::find_by_id(id).one(self.db).await?;
        if let Some(model) = found {
          let meta = push(model.meta.clone(), record);
          invoice::ActiveModel { meta: Set(Some(meta)), ..model.into() }
            .update(self.db)
            .await?;
        }
      }
    }
    Ok(())
  }
}

impl<'a, C> Referral<'a, C>
where
  C: ConnectionTrait + TransactionTrait,
{
  pub async fn grant_topup_bonus(
    &self,
    payer_id: i32,
    nuts_amount: i64,
    source: BonusSource,
  ) -> Result<Option<Bonus>> {
    if nuts_amount <= 0 {
      return Ok(None);
    }

    let Some(referral) = self.of_referred(payer_id).await? else {
      return Ok(None);
    };
    if referral.status != ReferralStatus::Confirmed
      || referral.referrer_id == payer_id
    {
      return Ok(None);
    }

    let amount = bonus_for(nuts_amount);
    if amount == 0 {
      return Ok(None);
    }

    let reward = referral_reward::ActiveModel {
      referral_id: Set(referral.id),
      source_kind: Set(source.kind().to_string()),
      source_id: Set(source.id()),
      referrer_id: Set(referral.referrer_id),
      referred_id: Set(payer_id),
      amount: Set(amount),
      created_at: Set(Utc::now().naive_utc()),
    };

    // savepoint, so a repeated source only undoes the reward row
    let txn = self.db.begin().await?;
    match reward.insert(&txn).await {
      Ok(_) => {}
      Err(err) if sv::is_unique_violation(&err) => {
        txn.rollback().await?;
        let (kind, id) = (source.kind(), source.id());
        debug!("Referral bonus for {kind} #{id} already paid");
        return Ok(None);
      }
      Err(err) => return Err(err.into()),
    }

    let referrer = sv::User::new(&txn)
      .by_id(referral.referrer_id)
      .await?
      .ok_or(Error::UserNotFound)?;

    let reason =
      format!("Referral bonus {REFERRAL_BONUS_PERCENT}% of {nuts_amount}");
    let applied = sv::Nuts::new(&txn)
      .add_nuts(
        UserRef::Id(referrer.id),
        amount,
        Entry::new(NutsSource::ReferralBonus).reason(reason).meta(json!({
          "referral_id": referral.id,
          "payer_id": payer_id,
          "source": source.kind(),
          "source_id": source.id(),
        })),
      )
      .await?;

    let record = json!({
      "referrer_id": referrer.id,
      "amount": amount,
      "percent": REFERRAL_BONUS_PERCENT,
      "transaction_id": applied.transaction.id,
      "at": Utc::now().naive_utc(),
    });
    Referral::new(&txn).append_audit(source, record.clone()).await?;

    let log = sv::Log::new(&txn);
    log
      .write(
        Some(payer_id),
        event::REFERRAL_BONUS_GRANTED,
        Some(format!("Referrer {} got {amount} nuts", referrer.id)),
        Some(record.clone()),
      )
      .await?;
    log
      .write(
        Some(referrer.id),
        event::REFERRAL_BONUS_PAID,
        Some(format!("Bonus {amount} nuts for user {payer_id}")),
        Some(record),
      )
      .await?;

    let achievements = sv::Achievement::new(&txn);
    let referrer_grants = achievements
      .evaluate_and_grant(referrer.id, Trigger::Referral, None)
      .await?;
    let payer_grants =
      achievements.evaluate_and_grant(payer_id, Trigger::Referral, None).await?;

    txn.commit().await?;

    info!(
      "Referral bonus {amount} nuts to user {} for {payer_id}",
      referrer.id
    );
    Ok(Some(Bonus {
      referrer_id: referrer.id,
      referrer_tg_id: referrer.tg_user_id,
      amount,
      referrer_grants,
      payer_grants,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::{PaymentStatus, log_entry, user},
    testing,
  };

  async fn payment(
    db: &DatabaseConnection,
    user_id: i32,
    external_id: &str,
  ) -> i32 {
    payment::ActiveModel {
      user_id: Set(user_id),
      external_id: Set(external_id.into()),
      amount: Set(0),
      nuts_amount: Set(1000),
      status: Set(PaymentStatus::Completed),
      invoice_id: Set(None),
      meta: Set(None),
      created_at: Set(Utc::now().naive_utc()),
      completed_at: Set(None),
      ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
    .id
  }

  async fn confirmed_pair(
    db: &DatabaseConnection,
  ) -> (user::Model, user::Model) {
    let referrer = testing::user(db, 1).await;
    let referred = testing::user(db, 2).await;
    let sv = Referral::new(db);
    sv.register(referred.id, &referrer.referral_code).await.unwrap().unwrap();
    assert_eq!(sv.confirm(referred.id).await.unwrap(), Some(referrer.id));
    (referrer, referred)
  }

  #[test]
  fn test_bonus_is_floored_percent() {
    assert_eq!(bonus_for(1000), 100);
    assert_eq!(bonus_for(19), 1);
    assert_eq!(bonus_for(9), 0);
    assert_eq!(bonus_for(-50), 0);
  }

  #[tokio::test]
  async fn test_bonus_granted_once_per_source() {
    let db = testing::db().await;
    let (referrer, referred) = confirmed_pair(&db).await;
    let source = BonusSource::Payment(payment(&db, referred.id, "tx-1").await);
    let sv = Referral::new(&db);

    let bonus =
      sv.grant_topup_bonus(referred.id, 1000, source).await.unwrap().unwrap();
    assert_eq!(bonus.amount, 100);
    assert_eq!(bonus.referrer_tg_id, 1);

    let bonus = sv.grant_topup_bonus(referred.id, 1000, source).await.unwrap();
    assert!(bonus.is_none());

    let referrer = testing::reload(&db, referrer.id).await;
    assert_eq!(referrer.nuts_balance, 100);
    assert_eq!(sv.earned(referrer.id).await.unwrap(), 100);

    let paid =
      payment::Entity::find_by_id(source.id()).one(&db).await.unwrap().unwrap();
    let audit = &paid.meta.unwrap()["referral_bonus_topups"];
    assert_eq!(audit.as_array().unwrap().len(), 1);
    assert_eq!(audit[0]["amount"], 100);

    let logs = log_entry::Entity::find()
      .filter(
        log_entry::Column::EventType
          .is_in([event::REFERRAL_BONUS_GRANTED, event::REFERRAL_BONUS_PAID]),
      )
      .count(&db)
      .await
      .unwrap();
    assert_eq!(logs, 2);
  }

  #[tokio::test]
  async fn test_repeated_source_keeps_outer_transaction() {
    let db = testing::db().await;
    let (referrer, referred) = confirmed_pair(&db).await;
    let first = BonusSource::Payment(payment(&db, referred.id, "tx-1").await);
    let second = BonusSource::Payment(payment(&db, referred.id, "tx-2").await);

    let txn = db.begin().await.unwrap();
    let sv = Referral::new(&txn);
    let bonus = sv.grant_topup_bonus(referred.id, 1000, first).await.unwrap();
    assert!(bonus.is_some());
    let bonus = sv.grant_topup_bonus(referred.id, 1000, first).await.unwrap();
    assert!(bonus.is_none());
    let bonus = sv.grant_topup_bonus(referred.id, 500, second).await.unwrap();
    assert!(bonus.is_some());
    txn.commit().await.unwrap();

    assert_eq!(testing::reload(&db, referrer.id).await.nuts_balance, 150);
    let rewards = referral_reward::Entity::find().count(&db).await.unwrap();
    assert_eq!(rewards, 2);
  }

  #[tokio::test]
  async fn test_invoice_and_payment_sources_are_distinct() {
    let db = testing::db().await;
    let (referrer, referred) = confirmed_pair(&db).await;
    let id = payment(&db, referred.id, "tx-1").await;
    let sv = Referral::new(&db);

    for source in [BonusSource::Payment(id), BonusSource::Invoice(id)] {
      sv.grant_topup_bonus(referred.id, 500, source).await.unwrap();
    }

    assert_eq!(testing::reload(&db, referrer.id).await.nuts_balance, 100);
  }

  #[tokio::test]
  async fn test_pending_referral_earns_nothing() {
    let db = testing::db().await;
    let referrer = testing::user(&db, 1).await;
    let referred = testing::user(&db, 2).await;
    let sv = Referral::new(&db);
    sv.register(referred.id, &referrer.referral_code).await.unwrap();

    let source = BonusSource::Payment(payment(&db, referred.id, "tx-1").await);
    let bonus = sv.grant_topup_bonus(referred.id, 1000, source).await.unwrap();
    assert!(bonus.is_none());
    assert_eq!(testing::reload(&db, referrer.id).await.nuts_balance, 0);
  }

  #[tokio::test]
  async fn test_small_top_up_skips_bonus() {
    let db = testing::db().await;
    let (_, referred) = confirmed_pair(&db).await;
    let source = BonusSource::Payment(payment(&db, referred.id, "tx-1").await);
    let sv = Referral::new(&db);

    let bonus = sv.grant_topup_bonus(referred.id, 9, source).await.unwrap();
    assert!(bonus.is_none());
    let bonus = sv.grant_topup_bonus(referred.id, 0, source).await.unwrap();
    assert!(bonus.is_none());
  }

  #[tokio::test]
  async fn test_register_rejects_self_and_second_referral() {
    let db = testing::db().await;
    let first = testing::user(&db, 1).await;
    let second = testing::user(&db, 2).await;
    let third = testing::user(&db, 3).await;
    let sv = Referral::new(&db);

    let referral = sv.register(first.id, &first.referral_code).await.unwrap();
    assert!(referral.is_none());
    assert!(sv.register(first.id, "NOSUCHCODE").await.unwrap().is_none());

    let referral = sv.register(third.id, &first.referral_code).await.unwrap();
    assert!(referral.is_some());
    let referral = sv.register(third.id, &second.referral_code).await.unwrap();
    assert!(referral.is_none());

    assert_eq!(sv.count_pending(first.id).await.unwrap(), 1);
    assert_eq!(sv.count_confirmed(first.id).await.unwrap(), 0);
    assert!(sv.confirm(second.id).await.unwrap().is_none());
  }
}
