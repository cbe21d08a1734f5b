//! Nuts ledger. Every balance change goes with an immutable transaction row;
//! nothing here commits, callers own the transaction boundary.

use json::Value;
use sea_orm::sea_query::Expr;

use crate::{
  entity::{NutsSource, TransactionType, nuts_transaction, user},
  error::Nuts as NutsError,
  prelude::*,
  sv::{self, UserRef},
};

/// Describes why nuts move
#[derive(Debug, Clone)]
pub struct Entry {
  pub source: NutsSource,
  pub reason: Option<String>,
  pub invoice_id: Option<i32>,
  pub meta: Option<Value>,
  pub rate_snapshot: Option<f64>,
}

impl Entry {
  pub fn new(source: NutsSource) -> Self {
    Self {
      source,
      reason: None,
      invoice_id: None,
      meta: None,
      rate_snapshot: None,
    }
  }

  pub fn reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }

  pub fn invoice(mut self, invoice_id: Option<i32>) -> Self {
    self.invoice_id = invoice_id;
    self
  }

  pub fn meta(mut self, meta: Value) -> Self {
    self.meta = Some(meta);
    self
  }

  pub fn rate(mut self, rate: f64) -> Self {
    self.rate_snapshot = Some(rate);
    self
  }
}

#[derive(Debug, Clone)]
pub struct Applied {
  pub transaction: nuts_transaction::Model,
  /// Balance right after this movement
  pub balance: i64,
}

pub struct Nuts<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Nuts<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn add_nuts(
    &self,
    target: UserRef,
    amount: i64,
    entry: Entry,
  ) -> Result<Applied> {
    if amount <= 0 {
      return Err(NutsError::InvalidAmount(amount).into());
    }

    let user = self.target(target).await?;

    user::Entity::update_many()
      .col_expr(
        user::Column::NutsBalance,
        Expr::col(user::Column::NutsBalance).add(amount),
      )
      .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
      .filter(user::Column::Id.eq(user.id))
      .exec(self.db)
      .await?;

    let applied =
      self.record(user.id, amount, TransactionType::Credit, entry).await?;
    debug!(
      "Credited {amount} nuts to user {} ({:?}), balance {}",
      user.id, applied.transaction.kind, applied.balance
    );
    Ok(applied)
  }

  pub async fn subtract_nuts(
    &self,
    target: UserRef,
    amount: i64,
    entry: Entry,
  ) -> Result<Applied> {
    if amount <= 0 {
      return Err(NutsError::InvalidAmount(amount).into());
    }

    let user = self.target(target).await?;

    // the guard keeps the balance non-negative even under concurrent debits
    let res = user::Entity::update_many()
      .col_expr(
        user::Column::NutsBalance,
        Expr::col(user::Column::NutsBalance).sub(amount),
      )
      .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
      .filter(user::Column::Id.eq(user.id))
      .filter(user::Column::NutsBalance.gte(amount))
      .exec(self.db)
      .await?;

    if res.rows_affected == 0 {
      return Err(
        NutsError::InsufficientBalance { balance: user.nuts_balance, amount }
          .into(),
      );
    }

    let applied =
      self.record(user.id, amount, TransactionType::Debit, entry).await?;
    debug!(
      "Debited {amount} nuts from user {} ({:?}), balance {}",
      user.id, applied.transaction.kind, applied.balance
    );
    Ok(applied)
  }

  pub async fn history(
    &self,
    user_id: i32,
    limit: u64,
  ) -> Result<Vec<nuts_transaction::Model>> {
    let rows = nuts_transaction::Entity::find()
      .filter(nuts_transaction::Column::UserId.eq(user_id))
      .order_by_desc(nuts_transaction::Column::Id)
      .limit(limit)
      .all(self.db)
      .await?;
    Ok(rows)
  }

  /// Sum of debit amounts, i.e. nuts spent
  pub async fn spent(&self, user_id: i32) -> Result<i64> {
    self.total(user_id, TransactionType::Debit).await
  }

  /// Balance implied by the ledger: credits minus debits
  pub async fn balance_from_ledger(&self, user_id: i32) -> Result<i64> {
    let credits = self.total(user_id, TransactionType::Credit).await?;
    let debits = self.total(user_id, TransactionType::Debit).await?;
    Ok(credits - debits)
  }

  async fn total(&self, user_id: i32, ty: TransactionType) -> Result<i64> {
    let query = nuts_transaction::Entity::find()
      .filter(nuts_transaction::Column::UserId.eq(user_id))
      .filter(nuts_transaction::Column::TransactionType.eq(ty));
    sv::sum(self.db, query, nuts_transaction::Column::Amount).await
  }

  async fn target(&self, target: UserRef) -> Result<user::Model> {
    sv::User::new(self.db)
      .resolve(target)
      .await?
      .ok_or_else(|| NutsError::UserNotFound.into())
  }

  async fn record(
    &self,
    user_id: i32,
    amount: i64,
    ty: TransactionType,
    entry: Entry,
  ) -> Result<Applied> {
    let balance = user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .map(|user| user.nuts_balance)
      .ok_or(NutsError::UserNotFound)?;

    let transaction = nuts_transaction::ActiveModel {
      user_id: Set(user_id),
      amount: Set(amount),
      transaction_type: Set(ty),
      kind: Set(entry.source),
      status: Set("completed".to_string()),
      reason: Set(entry.reason),
      invoice_id: Set(entry.invoice_id),
      meta: Set(entry.meta),
      rate_snapshot: Set(entry.rate_snapshot),
      created_at: Set(Utc::now().naive_utc()),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    Ok(Applied { transaction, balance })
  }
}
