use json::json;

use crate::{
  entity::{InvoiceStatus, NutsSource, PaymentStatus, invoice, payment},
  prelude::*,
  sv::{
    self, UserRef,
    achievement::{Grant, Trigger},
    log::event,
    nuts::Entry,
    referral::{Bonus, BonusSource},
  },
};

/// Confirmed top-up delivered by the payment provider
#[derive(Debug, Clone)]
pub struct TopUp {
  pub external_id: String,
  pub tg_user_id: i64,
  /// Real-money balance credit
  pub amount: i64,
  /// Defaults to the invoice's nuts, else `amount * rate`
  pub nuts_amount: Option<i64>,
  pub invoice_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Credited {
  pub payment: payment::Model,
  /// Same `external_id` was already processed, nothing changed
  pub duplicate: bool,
  pub tg_user_id: i64,
  pub balance: i64,
  pub nuts_balance: i64,
  pub granted: Vec<Grant>,
  pub bonus: Option<Bonus>,
}

pub struct Payment<'a, C> {
  db: &'a C,
}

impl<'a, C> Payment<'a, C>
where
  C: ConnectionTrait + TransactionTrait,
{
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn by_external_id(
    &self,
    external_id: &str,
  ) -> Result<Option<payment::Model>> {
    let payment = payment::Entity::find()
      .filter(payment::Column::ExternalId.eq(external_id))
      .one(self.db)
      .await?;
    Ok(payment)
  }

  pub async fn create_invoice(
    &self,
    user_id: i32,
    amount: i64,
    nuts_amount: i64,
  ) -> Result<invoice::Model> {
    let invoice = invoice::ActiveModel {
      user_id: Set(user_id),
      amount: Set(amount),
      nuts_amount: Set(nuts_amount),
      status: Set(InvoiceStatus::Pending),
      meta: Set(None),
      created_at: Set(Utc::now().naive_utc()),
      paid_at: Set(None),
      ..Default::default()
    };
    Ok(invoice.insert(self.db).await?)
  }

  pub async fn top_up(&self, top_up: TopUp, rate: f64) -> Result<Credited> {
    if top_up.amount < 0 || top_up.nuts_amount.is_some_and(|nuts| nuts < 0) {
      let msg = "top-up amounts must not be negative";
      return Err(Error::InvalidArgs(msg.into()));
    }
    if top_up.external_id.trim().is_empty() {
      return Err(Error::InvalidArgs("external_id is empty".into()));
    }

    if let Some(existing) = self.by_external_id(&top_up.external_id).await? {
      return self.duplicate(existing).await;
    }

    let txn = self.db.begin().await?;
    let user =
      sv::User::new(&txn).get_or_create(top_up.tg_user_id, None).await?;

    let invoice = match top_up.invoice_id {
      Some(id) => Some(
        invoice::Entity::find_by_id(id)
          .one(&txn)
          .await?
          .filter(|invoice| invoice.user_id == user.id)
          .ok_or_else(|| Error::InvalidArgs(format!("unknown invoice #{id}")))?,
      ),
      None => None,
    };

    let nuts_amount = top_up
      .nuts_amount
      .or(invoice.as_ref().map(|invoice| invoice.nuts_amount))
      .unwrap_or_else(|| (top_up.amount as f64 * rate).floor() as i64);

    let now = Utc::now().naive_utc();
    let inserted = payment::ActiveModel {
      user_id: Set(user.id),
      external_id: Set(top_up.external_id.clone()),
      amount: Set(top_up.amount),
      nuts_amount: Set(nuts_amount),
      status: Set(PaymentStatus::Completed),
      invoice_id: Set(top_up.invoice_id),
      meta: Set(Some(json!({ "rate": rate }))),
      created_at: Set(now),
      completed_at: Set(Some(now)),
      ..Default::default()
    }
    .insert(&txn)
    .await;

    let payment = match inserted {
      Ok(payment) => payment,
      // concurrent delivery of the same payment won
      Err(err) if sv::is_unique_violation(&err) => {
        txn.rollback().await?;
        let existing = self
          .by_external_id(&top_up.external_id)
          .await?
          .ok_or_else(|| {
            Error::Internal("payment vanished after conflict".into())
          })?;
        return self.duplicate(existing).await;
      }
      Err(err) => return Err(err.into()),
    };

    if top_up.amount > 0 {
      sv::User::new(&txn).add_balance(user.id, top_up.amount).await?;
    }

    if nuts_amount > 0 {
      sv::Nuts::new(&txn)
        .add_nuts(
          UserRef::Id(user.id),
          nuts_amount,
          Entry::new(NutsSource::TopUp)
            .reason(format!("Top-up {}", payment.external_id))
            .invoice(payment.invoice_id)
            .rate(rate)
            .meta(json!({ "payment_id": payment.id })),
        )
        .await?;
    }

    if let Some(invoice) = invoice
      && invoice.status != InvoiceStatus::Paid
    {
      invoice::ActiveModel {
        status: Set(InvoiceStatus::Paid),
        paid_at: Set(Some(now)),
        ..invoice.into()
      }
      .update(&txn)
      .await?;
    }

    sv::Log::new(&txn)
      .write(
        Some(user.id),
        event::PAYMENT_COMPLETED,
        Some(format!("Payment {} completed", payment.external_id)),
        Some(json!({
          "payment_id": payment.id,
          "amount": payment.amount,
          "nuts_amount": nuts_amount,
        })),
      )
      .await?;

    let payload = json!({ "payment_id": payment.id, "amount": payment.amount });
    let granted = sv::Achievement::new(&txn)
      .evaluate_and_grant(user.id, Trigger::Payment, Some(&payload))
      .await?;

    let source = match payment.invoice_id {
      Some(id) => BonusSource::Invoice(id),
      None => BonusSource::Payment(payment.id),
    };
    let bonus = sv::Referral::new(&txn)
      .grant_topup_bonus(user.id, nuts_amount, source)
      .await?;

    let user =
      sv::User::new(&txn).by_id(user.id).await?.ok_or(Error::UserNotFound)?;
    // audit records may have been appended to the payment
    let payment = payment::Entity::find_by_id(payment.id)
      .one(&txn)
      .await?
      .unwrap_or(payment);

    txn.commit().await?;

    info!(
      "Payment {} credited user {}: balance +{}, nuts +{nuts_amount}",
      payment.external_id, user.id, payment.amount
    );
    Ok(Credited {
      payment,
      duplicate: false,
      tg_user_id: user.tg_user_id,
      balance: user.balance,
      nuts_balance: user.nuts_balance,
      granted,
      bonus,
    })
  }

  async fn duplicate(&self, payment: payment::Model) -> Result<Credited> {
    info!("Duplicate payment {} ignored", payment.external_id);
    let user = sv::User::new(self.db)
      .by_id(payment.user_id)
      .await?
      .ok_or(Error::UserNotFound)?;

    Ok(Credited {
      payment,
      duplicate: true,
      tg_user_id: user.tg_user_id,
      balance: user.balance,
      nuts_balance: user.nuts_balance,
      granted: Vec::new(),
      bonus: None,
    })
  }
}
