//! Request deduplication for the signed endpoints.
//!
//! A key moves `pending -> completed` and the stored response is replayed
//! verbatim until the key expires. A failed request releases its key.

use json::Value;
use sea_orm::sea_query::Expr;

use crate::{
  entity::{IdempotencyStatus, idempotency},
  prelude::*,
  sv,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Begin {
  /// The caller owns the key until `complete` or `release`
  Fresh,
  Replay { status: u16, body: Value },
}

pub struct Idempotency<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Idempotency<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn begin(
    &self,
    key: &str,
    endpoint: &str,
    ttl: Duration,
  ) -> Result<Begin> {
    let now = Utc::now().naive_utc();

    let existing = idempotency::Entity::find_by_id(key).one(self.db).await?;
    if let Some(entry) = existing {
      if is_expired(&entry, now, ttl) {
        debug!("Idempotency key `{key}` expired, starting over");
        idempotency::Entity::delete_by_id(key).exec(self.db).await?;
      } else if entry.endpoint != endpoint {
        return Err(Error::IdempotencyConflict);
      } else {
        return match (entry.status, entry.response_status) {
          (IdempotencyStatus::Completed, Some(status)) => Ok(Begin::Replay {
            status: u16::try_from(status).unwrap_or(200),
            body: entry.response_body.unwrap_or(Value::Null),
          }),
          _ => Err(Error::IdempotencyConflict),
        };
      }
    }

    self.claim(key, endpoint, now).await
  }

  async fn claim(
    &self,
    key: &str,
    endpoint: &str,
    now: DateTime,
  ) -> Result<Begin> {
    let entry = idempotency::ActiveModel {
      key: Set(key.to_string()),
      endpoint: Set(endpoint.to_string()),
      status: Set(IdempotencyStatus::Pending),
      response_status: Set(None),
      response_body: Set(None),
      created_at: Set(now),
      completed_at: Set(None),
    };

    match entry.insert(self.db).await {
      Ok(_) => Ok(Begin::Fresh),
      // another request claimed the key first
      Err(err) if sv::is_unique_violation(&err) => {
        Err(Error::IdempotencyConflict)
      }
      Err(err) => Err(err.into()),
    }
  }

  pub async fn complete(
    &self,
    key: &str,
    status: u16,
    body: &Value,
  ) -> Result<()> {
    let res = idempotency::Entity::update_many()
      .col_expr(
        idempotency::Column::Status,
        Expr::value(IdempotencyStatus::Completed),
      )
      .col_expr(
        idempotency::Column::ResponseStatus,
        Expr::value(i32::from(status)),
      )
      .col_expr(
        idempotency::Column::ResponseBody,
        Expr::value(body.clone()),
      )
      .col_expr(
        idempotency::Column::CompletedAt,
        Expr::value(Utc::now().naive_utc()),
      )
      .filter(idempotency::Column::Key.eq(key))
      .exec(self.db)
      .await?;

    if res.rows_affected == 0 {
      return Err(Error::Internal(format!(
        "idempotency key `{key}` vanished before completion"
      )));
    }
    Ok(())
  }

  /// Drops a pending key so the request can be retried
  pub async fn release(&self, key: &str) -> Result<()> {
    idempotency::Entity::delete_many()
      .filter(idempotency::Column::Key.eq(key))
      .filter(idempotency::Column::Status.eq(IdempotencyStatus::Pending))
      .exec(self.db)
      .await?;
    Ok(())
  }

  pub async fn purge_expired(&self, ttl: Duration) -> Result<u64> {
    let now = Utc::now().naive_utc();
    let Some(cutoff) =
      TimeDelta::from_std(ttl).ok().and_then(|ttl| now.checked_sub_signed(ttl))
    else {
      return Ok(0);
    };

    let res = idempotency::Entity::delete_many()
      .filter(idempotency::Column::CreatedAt.lte(cutoff))
      .exec(self.db)
      .await?;
    Ok(res.rows_affected)
  }
}

fn is_expired(
  entry: &idempotency::Model,
  now: DateTime,
  ttl: Duration,
) -> bool {
  TimeDelta::from_std(ttl)
    .ok()
    .and_then(|ttl| entry.created_at.checked_add_signed(ttl))
    .is_some_and(|deadline| deadline <= now)
}

#[cfg(test)]
mod tests {
  use json::json;

  use super::*;
  use crate::testing;

  const TTL: Duration = Duration::from_secs(3600);

  #[tokio::test]
  async fn test_completed_key_replays_response() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);

    let begin = sv.begin("k1", "/payments/webhook", TTL).await.unwrap();
    assert_eq!(begin, Begin::Fresh);
    let body = json!({ "success": true, "payment_id": 1 });
    sv.complete("k1", 200, &body).await.unwrap();

    let replay = sv.begin("k1", "/payments/webhook", TTL).await.unwrap();
    assert_eq!(replay, Begin::Replay { status: 200, body });
  }

  #[tokio::test]
  async fn test_pending_key_conflicts() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);

    sv.begin("k1", "/game/grant", TTL).await.unwrap();
    assert!(matches!(
      sv.begin("k1", "/game/grant", TTL).await,
      Err(Error::IdempotencyConflict)
    ));

    sv.release("k1").await.unwrap();
    assert_eq!(sv.begin("k1", "/game/grant", TTL).await.unwrap(), Begin::Fresh);
  }

  #[tokio::test]
  async fn test_racing_claim_conflicts() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);
    let now = Utc::now().naive_utc();

    assert_eq!(sv.claim("k1", "/game/grant", now).await.unwrap(), Begin::Fresh);
    assert!(matches!(
      sv.claim("k1", "/game/grant", now).await,
      Err(Error::IdempotencyConflict)
    ));
  }

  #[tokio::test]
  async fn test_complete_requires_claimed_key() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);

    assert!(sv.complete("ghost", 200, &json!({})).await.is_err());
    let begin = sv.begin("ghost", "/game/grant", TTL).await.unwrap();
    assert_eq!(begin, Begin::Fresh);
  }

  #[tokio::test]
  async fn test_key_is_bound_to_endpoint() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);

    sv.begin("k1", "/game/grant", TTL).await.unwrap();
    sv.complete("k1", 200, &json!({})).await.unwrap();
    assert!(matches!(
      sv.begin("k1", "/payments/webhook", TTL).await,
      Err(Error::IdempotencyConflict)
    ));
  }

  #[tokio::test]
  async fn test_expired_key_starts_over() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);

    sv.begin("k1", "/game/grant", TTL).await.unwrap();
    sv.complete("k1", 200, &json!({ "old": true })).await.unwrap();

    // zero ttl expires everything immediately
    let begin = sv.begin("k1", "/game/grant", Duration::ZERO).await.unwrap();
    assert_eq!(begin, Begin::Fresh);
    assert_eq!(sv.purge_expired(Duration::ZERO).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_release_keeps_completed_keys() {
    let db = testing::db().await;
    let sv = Idempotency::new(&db);

    sv.begin("k1", "/game/grant", TTL).await.unwrap();
    sv.complete("k1", 201, &json!({ "ok": 1 })).await.unwrap();
    sv.release("k1").await.unwrap();

    assert!(matches!(
      sv.begin("k1", "/game/grant", TTL).await.unwrap(),
      Begin::Replay { status: 201, .. }
    ));
  }
}
