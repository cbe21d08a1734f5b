//! Game server sync: opaque progress blobs and in-game nut grants

use json::{Value, json};

use crate::{
  entity::{NutsSource, game_progress, user},
  prelude::*,
  sv::{
    self, UserRef,
    achievement::{Grant, Trigger},
    log::event,
    nuts::Entry,
  },
};

/// Progress keys that may carry the playtime in seconds, first match wins
pub const PLAYTIME_KEYS: [&str; 6] = [
  "playtime",
  "play_time",
  "playtime_seconds",
  "time_in_game",
  "timeInGame",
  "timePlayed",
];

pub fn playtime_of(progress: &Value) -> Option<i64> {
  let value = PLAYTIME_KEYS.iter().find_map(|key| progress.get(key))?;
  match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
    }
    _ => None,
  }
}

#[derive(Debug, Clone)]
pub struct Pushed {
  pub progress: game_progress::Model,
  /// Verified account linked to the Roblox id, if any
  pub user: Option<user::Model>,
  pub granted: Vec<Grant>,
}

#[derive(Debug, Clone)]
pub struct Granted {
  pub user: user::Model,
  pub transaction_id: i32,
  pub granted: Vec<Grant>,
}

pub struct Game<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Game<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn push(
    &self,
    roblox_id: i64,
    progress: Value,
  ) -> Result<game_progress::Model> {
    let row = game_progress::ActiveModel {
      roblox_id: Set(roblox_id),
      progress: Set(progress),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    };
    Ok(row.insert(self.db).await?)
  }

  pub async fn latest(
    &self,
    roblox_id: i64,
  ) -> Result<Option<game_progress::Model>> {
    let row = game_progress::Entity::find()
      .filter(game_progress::Column::RobloxId.eq(roblox_id))
      .order_by_desc(game_progress::Column::Id)
      .one(self.db)
      .await?;
    Ok(row)
  }

  pub async fn playtime(&self, roblox_id: i64) -> Result<Option<i64>> {
    Ok(self.latest(roblox_id).await?.and_then(|row| playtime_of(&row.progress)))
  }
}

impl<'a, C> Game<'a, C>
where
  C: ConnectionTrait + TransactionTrait,
{
  /// Stores progress and evaluates the linked player
  pub async fn sync(&self, roblox_id: i64, progress: Value) -> Result<Pushed> {
    let txn = self.db.begin().await?;

    let row = Game::new(&txn).push(roblox_id, progress).await?;
    let user = sv::User::new(&txn).by_roblox(roblox_id).await?;

    let granted = match &user {
      Some(user) if !user.is_blocked => {
        let payload = json!({ "roblox_id": roblox_id, "progress_id": row.id });
        sv::Achievement::new(&txn)
          .evaluate_and_grant(user.id, Trigger::GameProgress, Some(&payload))
          .await?
      }
      _ => Vec::new(),
    };

    txn.commit().await?;
    Ok(Pushed { progress: row, user, granted })
  }

  pub async fn grant(
    &self,
    roblox_id: i64,
    amount: i64,
    reason: Option<String>,
  ) -> Result<Granted> {
    let txn = self.db.begin().await?;

    let user = sv::User::new(&txn)
      .by_roblox(roblox_id)
      .await?
      .ok_or(Error::UserNotFound)?;
    if user.is_blocked {
      return Err(Error::UserBlocked);
    }

    let reason = reason.unwrap_or_else(|| "Game reward".into());
    let applied = sv::Nuts::new(&txn)
      .add_nuts(
        UserRef::Id(user.id),
        amount,
        Entry::new(NutsSource::Game)
          .reason(reason.clone())
          .meta(json!({ "roblox_id": roblox_id })),
      )
      .await?;

    sv::Log::new(&txn)
      .write(
        Some(user.id),
        event::GAME_GRANT,
        Some(reason),
        Some(json!({
          "amount": amount,
          "transaction_id": applied.transaction.id,
        })),
      )
      .await?;

    let payload = json!({ "roblox_id": roblox_id, "amount": amount });
    let granted = sv::Achievement::new(&txn)
      .evaluate_and_grant(user.id, Trigger::GameGrant, Some(&payload))
      .await?;

    let user =
      sv::User::new(&txn).by_id(user.id).await?.ok_or(Error::UserNotFound)?;
    txn.commit().await?;

    info!("Game granted {amount} nuts to user {} ({roblox_id})", user.id);
    Ok(Granted { user, transaction_id: applied.transaction.id, granted })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{sv::achievement::NewAchievement, testing};

  #[test]
  fn test_playtime_keys_in_order() {
    let both = json!({ "playtime": 10, "timePlayed": 99 });
    assert_eq!(playtime_of(&both), Some(10));
    assert_eq!(playtime_of(&json!({ "timeInGame": "42" })), Some(42));
    assert_eq!(playtime_of(&json!({ "playtime_seconds": 12.7 })), Some(12));
    assert_eq!(playtime_of(&json!({ "coins": 5 })), None);
    assert_eq!(playtime_of(&json!({ "playtime": "soon" })), None);
    assert_eq!(playtime_of(&json!([1, 2])), None);
  }

  #[tokio::test]
  async fn test_latest_progress_wins() {
    let db = testing::db().await;
    let sv = Game::new(&db);

    sv.push(9, json!({ "level": 1 })).await.unwrap();
    sv.push(9, json!({ "level": 2 })).await.unwrap();
    sv.push(10, json!({ "level": 7 })).await.unwrap();

    let latest = sv.latest(9).await.unwrap().unwrap();
    assert_eq!(latest.progress["level"], 2);
    assert!(sv.latest(11).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_sync_evaluates_linked_player() {
    let db = testing::db().await;
    testing::player(&db, 1, 9).await;
    sv::Achievement::new(&db)
      .create(
        NewAchievement::new("Veteran", 5, "time_in_game_at_least")
          .threshold(60),
      )
      .await
      .unwrap();
    let sv = Game::new(&db);

    let pushed = sv.sync(9, json!({ "playtime": 30 })).await.unwrap();
    assert!(pushed.user.is_some());
    assert!(pushed.granted.is_empty());

    let pushed = sv.sync(9, json!({ "playtime": 90 })).await.unwrap();
    assert_eq!(pushed.granted.len(), 1);

    // unknown players are stored but evaluate nobody
    let pushed = sv.sync(404, json!({ "playtime": 90 })).await.unwrap();
    assert!(pushed.user.is_none());
  }

  #[tokio::test]
  async fn test_grant_credits_linked_player() {
    let db = testing::db().await;
    let player = testing::player(&db, 1, 9).await;
    let sv = Game::new(&db);

    let granted = sv.grant(9, 40, Some("Quest".into())).await.unwrap();
    assert_eq!(granted.user.nuts_balance, 40);

    let history = sv::Nuts::new(&db).history(player.id, 1).await.unwrap();
    assert_eq!(history[0].kind, NutsSource::Game);
    assert_eq!(history[0].reason.as_deref(), Some("Quest"));

    assert!(matches!(sv.grant(404, 40, None).await, Err(Error::UserNotFound)));
  }
}
