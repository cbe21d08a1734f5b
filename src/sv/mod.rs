pub mod achievement;
pub mod game;
pub mod idempotency;
pub mod log;
pub mod nuts;
pub mod payment;
pub mod product;
pub mod promo;
pub mod purchase;
pub mod referral;
pub mod user;

pub use achievement::Achievement;
pub use game::Game;
pub use idempotency::Idempotency;
pub use log::Log;
pub use nuts::Nuts;
pub use payment::Payment;
pub use product::Product;
pub use promo::Promo;
pub use purchase::Purchase;
pub use referral::Referral;
pub use user::{User, UserRef};

use sea_orm::{
  DbErr, EntityTrait, QuerySelect, Select, SqlErr,
  sea_query::{Alias, Expr, Func},
};

use crate::prelude::*;

/// `SUM(col)` over the query, zero for no rows
pub(crate) async fn sum<E, C>(
  db: &C,
  query: Select<E>,
  col: E::Column,
) -> Result<i64>
where
  E: EntityTrait,
  C: ConnectionTrait,
{
  let total = Func::cast_as(Func::sum(Expr::col(col)), Alias::new("BIGINT"));
  let total: Option<Option<i64>> = query
    .select_only()
    .column_as(Expr::expr(total), "total")
    .into_tuple()
    .one(db)
    .await?;

  Ok(total.flatten().unwrap_or(0))
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
  matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::{NutsSource, nuts_transaction},
    sv::nuts::Entry,
    testing,
  };

  #[tokio::test]
  async fn test_sum_over_rows_and_empty_set() {
    let db = testing::db().await;
    let user = testing::user(&db, 1).await;
    let rows = || {
      nuts_transaction::Entity::find()
        .filter(nuts_transaction::Column::UserId.eq(user.id))
    };

    let col = nuts_transaction::Column::Amount;
    assert_eq!(sum(&db, rows(), col).await.unwrap(), 0);

    let nuts = Nuts::new(&db);
    for amount in [40, 2] {
      nuts
        .add_nuts(UserRef::Id(user.id), amount, Entry::new(NutsSource::Admin))
        .await
        .unwrap();
    }
    assert_eq!(sum(&db, rows(), col).await.unwrap(), 42);
  }
}
