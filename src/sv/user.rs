use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{entity::user, prelude::*, sv};

/// Lookup key used by the ledger and admin commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRef {
  Id(i32),
  Telegram(i64),
}

pub struct User<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> User<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn get_or_create(
    &self,
    tg_user_id: i64,
    username: Option<String>,
  ) -> Result<user::Model> {
    if let Some(user) = self.by_tg(tg_user_id).await? {
      if username.is_some() && user.username != username {
        let user = user::ActiveModel {
          username: Set(username),
          updated_at: Set(Utc::now().naive_utc()),
          ..user.into()
        }
        .update(self.db)
        .await?;
        return Ok(user);
      }
      return Ok(user);
    }

    let now = Utc::now().naive_utc();
    let user = user::ActiveModel {
      tg_user_id: Set(tg_user_id),
      username: Set(username),
      roblox_id: Set(None),
      roblox_username: Set(None),
      balance: Set(0),
      nuts_balance: Set(0),
      is_blocked: Set(false),
      verified: Set(false),
      referral_code: Set(referral_code()),
      selected_achievement_id: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
      ..Default::default()
    };

    match user.insert(self.db).await {
      Ok(user) => {
        info!("Registered user {tg_user_id}");
        Ok(user)
      }
      // lost a race against a concurrent /start
      Err(err) if sv::is_unique_violation(&err) => {
        self.by_tg(tg_user_id).await?.ok_or(Error::UserNotFound)
      }
      Err(err) => Err(err.into()),
    }
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_tg(&self, tg_user_id: i64) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
      .filter(user::Column::TgUserId.eq(tg_user_id))
      .one(self.db)
      .await?;
    Ok(user)
  }

  pub async fn resolve(&self, user: UserRef) -> Result<Option<user::Model>> {
    match user {
      UserRef::Id(id) => self.by_id(id).await,
      UserRef::Telegram(tg_user_id) => self.by_tg(tg_user_id).await,
    }
  }

  /// Verified account linked to the Roblox id
  pub async fn by_roblox(&self, roblox_id: i64) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
      .filter(user::Column::RobloxId.eq(roblox_id))
      .filter(user::Column::Verified.eq(true))
      .one(self.db)
      .await?;
    Ok(user)
  }

  pub async fn by_referral_code(
    &self,
    code: &str,
  ) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
      .filter(user::Column::ReferralCode.eq(code.trim().to_uppercase()))
      .one(self.db)
      .await?;
    Ok(user)
  }

  pub async fn set_blocked(
    &self,
    tg_user_id: i64,
    blocked: bool,
  ) -> Result<user::Model> {
    let user = self.by_tg(tg_user_id).await?.ok_or(Error::UserNotFound)?;

    let user = user::ActiveModel {
      is_blocked: Set(blocked),
      updated_at: Set(Utc::now().naive_utc()),
      ..user.into()
    }
    .update(self.db)
    .await?;

    Ok(user)
  }

  pub async fn verify(
    &self,
    user_id: i32,
    roblox_id: i64,
    roblox_username: String,
  ) -> Result<user::Model> {
    let user = self.by_id(user_id).await?.ok_or(Error::UserNotFound)?;

    let user = user::ActiveModel {
      roblox_id: Set(Some(roblox_id)),
      roblox_username: Set(Some(roblox_username)),
      verified: Set(true),
      updated_at: Set(Utc::now().naive_utc()),
      ..user.into()
    }
    .update(self.db)
    .await?;

    Ok(user)
  }

  /// Adds to the real-money balance; negative amounts are rejected
  pub async fn add_balance(&self, user_id: i32, amount: i64) -> Result<i64> {
    if amount < 0 {
      let msg = format!("negative balance top-up {amount}");
      return Err(Error::InvalidArgs(msg));
    }

    let res = user::Entity::update_many()
      .col_expr(
        user::Column::Balance,
        Expr::col(user::Column::Balance).add(amount),
      )
      .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
      .filter(user::Column::Id.eq(user_id))
      .exec(self.db)
      .await?;

    if res.rows_affected == 0 {
      return Err(Error::UserNotFound);
    }

    let user = self.by_id(user_id).await?.ok_or(Error::UserNotFound)?;
    Ok(user.balance)
  }

  pub async fn leaderboard(&self, limit: u64) -> Result<Vec<user::Model>> {
    let users = user::Entity::find()
      .filter(user::Column::IsBlocked.eq(false))
      .order_by_desc(user::Column::NutsBalance)
      .order_by_asc(user::Column::Id)
      .limit(limit)
      .all(self.db)
      .await?;
    Ok(users)
  }
}

fn referral_code() -> String {
  Uuid::new_v4().simple().to_string()[..10].to_uppercase()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing;

  #[tokio::test]
  async fn test_get_or_create_is_stable() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let first = sv.get_or_create(42, Some("nutty".into())).await.unwrap();
    let second = sv.get_or_create(42, None).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.username.as_deref(), Some("nutty"));
    assert_eq!(first.nuts_balance, 0);
    assert_eq!(first.referral_code.len(), 10);
  }

  #[tokio::test]
  async fn test_resolve_by_both_keys() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let user = sv.get_or_create(7, None).await.unwrap();

    let by_id = sv.resolve(UserRef::Id(user.id)).await.unwrap().unwrap();
    let by_tg = sv.resolve(UserRef::Telegram(7)).await.unwrap().unwrap();
    assert_eq!(by_id, by_tg);

    assert!(sv.resolve(UserRef::Telegram(8)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_referral_code_lookup_ignores_case() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let user = sv.get_or_create(7, None).await.unwrap();
    let code = user.referral_code.to_lowercase();

    let found = sv.by_referral_code(&code).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
  }

  #[tokio::test]
  async fn test_roblox_lookup_requires_verification() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let user = sv.get_or_create(7, None).await.unwrap();
    assert!(sv.by_roblox(1001).await.unwrap().is_none());

    sv.verify(user.id, 1001, "Builderman".into()).await.unwrap();
    let linked = sv.by_roblox(1001).await.unwrap().unwrap();
    assert_eq!(linked.id, user.id);
    assert!(linked.verified);
  }

  #[tokio::test]
  async fn test_leaderboard_skips_blocked() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let rich = testing::user_with_nuts(&db, 1, 500).await;
    testing::user_with_nuts(&db, 2, 900).await;
    testing::user_with_nuts(&db, 3, 100).await;
    sv.set_blocked(2, true).await.unwrap();

    let top = sv.leaderboard(10).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].id, rich.id);
  }
}
