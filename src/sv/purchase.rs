use json::json;

use crate::{
  entity::{NutsSource, PurchaseStatus, product, purchase},
  prelude::*,
  sv::{
    self, UserRef,
    achievement::{Grant, Trigger},
    log::event,
    nuts::Entry,
  },
};

#[derive(Debug, Clone)]
pub struct Bought {
  pub purchase: purchase::Model,
  pub product: product::Model,
  pub nuts_balance: i64,
  pub granted: Vec<Grant>,
}

pub struct Purchase<'a, C> {
  db: &'a C,
}

impl<'a, C> Purchase<'a, C>
where
  C: ConnectionTrait + TransactionTrait,
{
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// Debits the price and records the purchase in one transaction
  pub async fn buy(&self, user_id: i32, product_id: i32) -> Result<Bought> {
    let txn = self.db.begin().await?;

    let product = sv::Product::new(&txn)
      .by_id(product_id)
      .await?
      .filter(|product| product.is_active)
      .ok_or(Error::ProductNotFound)?;

    let user =
      sv::User::new(&txn).by_id(user_id).await?.ok_or(Error::UserNotFound)?;
    if user.is_blocked {
      return Err(Error::UserBlocked);
    }

    let applied = sv::Nuts::new(&txn)
      .subtract_nuts(
        UserRef::Id(user.id),
        product.price,
        Entry::new(NutsSource::Purchase)
          .reason(format!("Purchase: {}", product.name))
          .meta(json!({ "product_id": product.id })),
      )
      .await?;

    let purchase = purchase::ActiveModel {
      user_id: Set(user.id),
      product_id: Set(Some(product.id)),
      price: Set(product.price),
      status: Set(PurchaseStatus::Completed),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    }
    .insert(&txn)
    .await?;

    sv::Log::new(&txn)
      .write(
        Some(user.id),
        event::PURCHASE_COMPLETED,
        Some(format!("Bought `{}` for {}", product.name, product.price)),
        Some(json!({
          "purchase_id": purchase.id,
          "product_id": product.id,
          "price": product.price,
          "transaction_id": applied.transaction.id,
        })),
      )
      .await?;

    let payload = json!({ "product_id": product.id });
    let granted = sv::Achievement::new(&txn)
      .evaluate_and_grant(user.id, Trigger::Purchase, Some(&payload))
      .await?;

    let nuts_balance = sv::User::new(&txn)
      .by_id(user.id)
      .await?
      .map_or(applied.balance, |user| user.nuts_balance);

    txn.commit().await?;

    info!(
      "User {} bought product #{} for {}",
      user.id, product.id, product.price
    );
    Ok(Bought { purchase, product, nuts_balance, granted })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    error::Nuts as NutsError, sv::achievement::NewAchievement, testing,
  };

  #[tokio::test]
  async fn test_buy_debits_and_grants() {
    let db = testing::db().await;
    let user = testing::user_with_nuts(&db, 1, 500).await;
    let hat =
      sv::Product::new(&db).create("Hat".into(), None, 200).await.unwrap();
    sv::Achievement::new(&db)
      .create(
        NewAchievement::new("Hatter", 20, "product_purchase")
          .value(hat.id.to_string()),
      )
      .await
      .unwrap();

    let bought = Purchase::new(&db).buy(user.id, hat.id).await.unwrap();
    assert_eq!(bought.purchase.status, PurchaseStatus::Completed);
    assert_eq!(bought.granted.len(), 1);
    assert_eq!(bought.nuts_balance, 320);

    let nuts = sv::Nuts::new(&db);
    assert_eq!(nuts.spent(user.id).await.unwrap(), 200);
    assert_eq!(nuts.balance_from_ledger(user.id).await.unwrap(), 320);
  }

  #[tokio::test]
  async fn test_insufficient_nuts_records_nothing() {
    let db = testing::db().await;
    let user = testing::user_with_nuts(&db, 1, 50).await;
    let hat =
      sv::Product::new(&db).create("Hat".into(), None, 200).await.unwrap();
    let sv = Purchase::new(&db);

    let result = sv.buy(user.id, hat.id).await;
    assert!(matches!(
      result,
      Err(Error::Nuts(NutsError::InsufficientBalance {
        balance: 50,
        amount: 200
      }))
    ));
    let purchases = purchase::Entity::find()
      .filter(purchase::Column::UserId.eq(user.id))
      .count(&db)
      .await
      .unwrap();
    assert_eq!(purchases, 0);
    assert_eq!(testing::reload(&db, user.id).await.nuts_balance, 50);
  }

  #[tokio::test]
  async fn test_inactive_product_is_not_sold() {
    let db = testing::db().await;
    let user = testing::user_with_nuts(&db, 1, 500).await;
    let products = sv::Product::new(&db);
    let hat = products.create("Hat".into(), None, 200).await.unwrap();
    products.set_active(hat.id, false).await.unwrap();

    assert!(matches!(
      Purchase::new(&db).buy(user.id, hat.id).await,
      Err(Error::ProductNotFound)
    ));
  }
}
