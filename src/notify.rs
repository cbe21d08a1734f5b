//! Outbound user notifications. Delivery is best effort: a failure is logged
//! and never undoes the committed change it reports.

use teloxide::{
  Bot,
  prelude::*,
  types::{ChatId, ParseMode},
};

use crate::{
  prelude::*,
  sv::{achievement::Grant, payment::Credited},
};

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl Notifier for Bot {
  async fn notify(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
    self
      .send_message(ChatId(chat_id), text.to_string())
      .parse_mode(ParseMode::Html)
      .await?;
    Ok(())
  }
}

pub async fn send(notifier: &dyn Notifier, chat_id: i64, text: &str) {
  if let Err(err) = notifier.notify(chat_id, text).await {
    warn!("Failed to notify {chat_id}: {err:#}");
  }
}

pub fn grants_text(grants: &[Grant]) -> Option<String> {
  if grants.is_empty() {
    return None;
  }

  let mut text = String::from("🏆 <b>New achievements!</b>\n");
  for grant in grants {
    text.push_str(&format!("\n• {}", utils::escape(&grant.achievement.name)));
    if grant.reward() > 0 {
      text.push_str(&format!(" (+{} 🥜)", grant.reward()));
    }
  }
  Some(text)
}

pub async fn grants(notifier: &dyn Notifier, chat_id: i64, grants: &[Grant]) {
  if let Some(text) = grants_text(grants) {
    send(notifier, chat_id, &text).await;
  }
}

/// Tells the payer and the referrer what a top-up earned them
pub async fn top_up(notifier: &dyn Notifier, credited: &Credited) {
  if credited.duplicate {
    return;
  }

  let mut payer = format!(
    "💳 <b>Payment received</b>\n\nBalance: {}\nNuts: {} 🥜",
    credited.balance, credited.nuts_balance
  );
  if let Some(text) = grants_text(&credited.granted) {
    payer.push_str("\n\n");
    payer.push_str(&text);
  }
  send(notifier, credited.tg_user_id, &payer).await;

  if let Some(bonus) = &credited.bonus {
    let text = format!("🤝 Your referral topped up: +{} 🥜", bonus.amount);
    send(notifier, bonus.referrer_tg_id, &text).await;
    grants(notifier, bonus.referrer_tg_id, &bonus.referrer_grants).await;
    grants(notifier, credited.tg_user_id, &bonus.payer_grants).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    sv::{self, achievement::NewAchievement, payment::TopUp},
    testing::{self, Outbox},
  };

  #[tokio::test]
  async fn test_top_up_notifies_both_parties() {
    let db = testing::db().await;
    let referrer = testing::user(&db, 1).await;
    let payer = testing::user(&db, 2).await;
    let referral = sv::Referral::new(&db);
    referral.register(payer.id, &referrer.referral_code).await.unwrap();
    referral.confirm(payer.id).await.unwrap();
    sv::Achievement::new(&db)
      .create(
        NewAchievement::new("First <coin>", 1, "payments_sum_at_least")
          .threshold(1),
      )
      .await
      .unwrap();

    let credited = sv::Payment::new(&db)
      .top_up(
        TopUp {
          external_id: "pay-1".into(),
          tg_user_id: 2,
          amount: 500,
          nuts_amount: Some(500),
          invoice_id: None,
        },
        1.0,
      )
      .await
      .unwrap();

    let outbox = Outbox::new();
    top_up(outbox.as_ref(), &credited).await;

    let to_payer = outbox.sent_to(2);
    assert_eq!(to_payer.len(), 1);
    assert!(to_payer[0].contains("First &lt;coin&gt;"));
    let to_referrer = outbox.sent_to(1);
    assert_eq!(to_referrer, ["🤝 Your referral topped up: +50 🥜".to_string()]);
  }

  #[tokio::test]
  async fn test_broken_notifier_is_swallowed() {
    let outbox = Outbox::broken();
    send(outbox.as_ref(), 1, "hello").await;
    assert!(outbox.sent_to(1).is_empty());
  }
}
