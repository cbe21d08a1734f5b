use json::json;
use sea_orm::sea_query::Expr;

use crate::{
  entity::{NutsSource, promo_code, promo_redemption},
  error::Promo as PromoError,
  prelude::*,
  sv::{
    self, UserRef,
    achievement::{Grant, Trigger},
    log::event,
    nuts::Entry,
  },
};

#[derive(Debug, Clone)]
pub struct Redeemed {
  pub promo: promo_code::Model,
  pub nuts_balance: i64,
  pub granted: Vec<Grant>,
}

/// Codes are case-insensitive and stored uppercase
pub fn normalize_code(code: &str) -> String {
  code.trim().to_uppercase()
}

pub struct Promo<'a, C> {
  db: &'a C,
}

impl<'a, C> Promo<'a, C>
where
  C: ConnectionTrait + TransactionTrait,
{
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn create(
    &self,
    code: &str,
    reward: i64,
    max_uses: Option<i32>,
    expires_at: Option<DateTime>,
  ) -> Result<promo_code::Model> {
    let code = normalize_code(code);
    if code.is_empty() {
      return Err(Error::InvalidArgs("promo code is empty".into()));
    }
    if reward <= 0 {
      let msg = format!("reward must be positive, got {reward}");
      return Err(Error::InvalidArgs(msg));
    }
    if max_uses.is_some_and(|max| max <= 0) {
      return Err(Error::InvalidArgs("max uses must be positive".into()));
    }

    let promo = promo_code::ActiveModel {
      code: Set(code.clone()),
      reward: Set(reward),
      max_uses: Set(max_uses),
      uses: Set(0),
      expires_at: Set(expires_at),
      is_active: Set(true),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    };

    match promo.insert(self.db).await {
      Ok(promo) => Ok(promo),
      Err(err) if sv::is_unique_violation(&err) => {
        Err(Error::InvalidArgs(format!("promo code {code} already exists")))
      }
      Err(err) => Err(err.into()),
    }
  }

  pub async fn by_code(&self, code: &str) -> Result<Option<promo_code::Model>> {
    let promo = promo_code::Entity::find()
      .filter(promo_code::Column::Code.eq(normalize_code(code)))
      .one(self.db)
      .await?;
    Ok(promo)
  }

  pub async fn redeem(&self, user_id: i32, code: &str) -> Result<Redeemed> {
    let txn = self.db.begin().await?;

    let promo =
      Promo::new(&txn).by_code(code).await?.ok_or(PromoError::NotFound)?;
    let now = Utc::now().naive_utc();
    if !promo.is_active || promo.is_expired(now) {
      return Err(PromoError::Inactive.into());
    }
    if promo.is_exhausted() {
      return Err(PromoError::Exhausted.into());
    }

    let claimed = promo_redemption::Entity::find_by_id((promo.id, user_id))
      .one(&txn)
      .await?
      .is_some();
    if claimed {
      return Err(PromoError::Claimed.into());
    }

    let redemption = promo_redemption::ActiveModel {
      promo_id: Set(promo.id),
      user_id: Set(user_id),
      redeemed_at: Set(now),
    };
    match redemption.insert(&txn).await {
      Ok(_) => {}
      Err(err) if sv::is_unique_violation(&err) => {
        return Err(PromoError::Claimed.into());
      }
      Err(err) => return Err(err.into()),
    }

    // the guard keeps `uses` within `max_uses` under concurrent redemptions
    let mut bump = promo_code::Entity::update_many()
      .col_expr(
        promo_code::Column::Uses,
        Expr::col(promo_code::Column::Uses).add(1),
      )
      .filter(promo_code::Column::Id.eq(promo.id));
    if let Some(max) = promo.max_uses {
      bump = bump.filter(promo_code::Column::Uses.lt(max));
    }
    if bump.exec(&txn).await?.rows_affected == 0 {
      return Err(PromoError::Exhausted.into());
    }

    let applied = sv::Nuts::new(&txn)
      .add_nuts(
        UserRef::Id(user_id),
        promo.reward,
        Entry::new(NutsSource::Promocode)
          .reason(format!("Promo code {}", promo.code))
          .meta(json!({ "promo_id": promo.id })),
      )
      .await?;

    sv::Log::new(&txn)
      .write(
        Some(user_id),
        event::PROMO_REDEEMED,
        Some(format!("Redeemed {} for {}", promo.code, promo.reward)),
        Some(json!({ "promo_id": promo.id, "reward": promo.reward })),
      )
      .await?;

    let payload = json!({ "promo_id": promo.id });
    let granted = sv::Achievement::new(&txn)
      .evaluate_and_grant(user_id, Trigger::Promocode, Some(&payload))
      .await?;

    let nuts_balance = sv::User::new(&txn)
      .by_id(user_id)
      .await?
      .map_or(applied.balance, |user| user.nuts_balance);

    txn.commit().await?;

    info!("User {user_id} redeemed promo code {}", promo.code);
    Ok(Redeemed { promo, nuts_balance, granted })
  }
}
