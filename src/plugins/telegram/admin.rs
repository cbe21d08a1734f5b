use std::sync::Arc;

use json::{Value, json};
use teloxide::{
  prelude::*,
  utils::command::{BotCommands, ParseError},
};

use super::ReplyBot;
use crate::{
  entity::{ConditionKind, NutsSource, user},
  notify,
  plugins::cron,
  prelude::*,
  state::AppState,
  sv::{self, UserRef, achievement::NewAchievement, log::event, nuts::Entry},
};

const LOGS_LIMIT: u64 = 20;

fn parse_achievement(
  input: String,
) -> std::result::Result<(String, i64, String, String), ParseError> {
  let usage = || {
    ParseError::IncorrectFormat(
      "Usage: /newachievement <name> <reward> <condition_type> [value]".into(),
    )
  };

  let mut parts = input.trim().splitn(4, ' ');
  // names with spaces are typed with underscores
  let name = parts.next().unwrap_or_default().replace('_', " ");
  let reward = parts.next().and_then(|r| r.parse().ok()).ok_or_else(usage)?;
  let condition_type = parts.next().unwrap_or_default().to_string();
  let value = parts.next().unwrap_or_default().trim().to_string();

  if name.is_empty() || condition_type.is_empty() {
    return Err(usage());
  }

  Ok((name, reward, condition_type, value))
}

fn parse_product(
  input: String,
) -> std::result::Result<(i64, String), ParseError> {
  let mut parts = input.trim().splitn(2, ' ');
  let price = parts.next().and_then(|p| p.parse().ok());
  let name = parts.next().unwrap_or_default().trim().to_string();

  match price {
    Some(price) if !name.is_empty() => Ok((price, name)),
    _ => {
      let usage = "Usage: /newproduct <price> <name>";
      Err(ParseError::IncorrectFormat(usage.into()))
    }
  }
}

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Admin commands:")]
pub enum AdminCommand {
  #[command(
    description = "credit nuts: <tg_id> <amount>",
    parse_with = "split"
  )]
  Give { tg_user_id: i64, amount: i64 },
  #[command(description = "debit nuts: <tg_id> <amount>", parse_with = "split")]
  Take { tg_user_id: i64, amount: i64 },
  #[command(description = "block a user: <tg_id>")]
  Ban(i64),
  #[command(description = "unblock a user: <tg_id>")]
  Unban(i64),
  #[command(
    description = "grant an achievement: <tg_id> <achievement_id>",
    parse_with = "split"
  )]
  Grant { tg_user_id: i64, achievement_id: i32 },
  #[command(
    description = "promo code: <code> <reward> <max_uses>, 0 = unlimited",
    parse_with = "split"
  )]
  NewPromo { code: String, reward: i64, max_uses: i32 },
  #[command(
    description = "new achievement: <name> <reward> <condition_type> [value]",
    parse_with = parse_achievement
  )]
  NewAchievement {
    name: String,
    reward: i64,
    condition_type: String,
    value: String,
  },
  #[command(
    description = "create a product: <price> <name>",
    parse_with = parse_product
  )]
  NewProduct { price: i64, name: String },
  #[command(description = "take a product off the shop: <product_id>")]
  HideProduct(i32),
  #[command(description = "put a product back on sale: <product_id>")]
  ShowProduct(i32),
  #[command(
    description = "issue a top-up invoice: <tg_id> <amount> <nuts>",
    parse_with = "split"
  )]
  Invoice { tg_user_id: i64, amount: i64, nuts_amount: i64 },
  #[command(description = "recent events, optionally of one user: [tg_id]")]
  Logs(String),
  #[command(description = "re-evaluate achievements of every user")]
  Recalc,
}

impl AdminCommand {
  fn name(&self) -> &'static str {
    match self {
      AdminCommand::Give { .. } => "give",
      AdminCommand::Take { .. } => "take",
      AdminCommand::Ban(_) => "ban",
      AdminCommand::Unban(_) => "unban",
      AdminCommand::Grant { .. } => "grant",
      AdminCommand::NewPromo { .. } => "newpromo",
      AdminCommand::NewAchievement { .. } => "newachievement",
      AdminCommand::NewProduct { .. } => "newproduct",
      AdminCommand::HideProduct(_) => "hideproduct",
      AdminCommand::ShowProduct(_) => "showproduct",
      AdminCommand::Invoice { .. } => "invoice",
      AdminCommand::Logs(_) => "logs",
      AdminCommand::Recalc => "recalc",
    }
  }
}

pub async fn handle(
  app: Arc<AppState>,
  bot: ReplyBot,
  cmd: AdminCommand,
) -> ResponseResult<()> {
  let result = execute(&app, bot.user_id, cmd).await;
  bot.reply_result(result).await
}

/// Runs an admin command on behalf of `admin`, returning the reply
pub async fn execute(
  app: &AppState,
  admin: i64,
  cmd: AdminCommand,
) -> Result<String> {
  let command = cmd.name();

  let (reply, audit) = match cmd {
    AdminCommand::Give { tg_user_id, amount } => {
      let txn = app.db.begin().await?;
      let applied = sv::Nuts::new(&txn)
        .add_nuts(
          UserRef::Telegram(tg_user_id),
          amount,
          Entry::new(NutsSource::Admin).reason(format!("admin {admin}")),
        )
        .await?;
      let user_id = applied.transaction.user_id;
      let granted = sv::Achievement::new(&txn)
        .evaluate_and_grant(user_id, sv::achievement::Trigger::Manual, None)
        .await?;
      txn.commit().await?;

      notify::send(
        app.notifier.as_ref(),
        tg_user_id,
        &format!("🎁 You received {amount} 🥜"),
      )
      .await;
      notify::grants(app.notifier.as_ref(), tg_user_id, &granted).await;

      (
        format!(
          "✅ Credited {amount} 🥜 to <code>{tg_user_id}</code>, balance {}",
          applied.balance
        ),
        Some((
          Some(user_id),
          json!({ "target": tg_user_id, "amount": amount }),
        )),
      )
    }

    AdminCommand::Take { tg_user_id, amount } => {
      let applied = sv::Nuts::new(&app.db)
        .subtract_nuts(
          UserRef::Telegram(tg_user_id),
          amount,
          Entry::new(NutsSource::Admin).reason(format!("admin {admin}")),
        )
        .await?;
      (
        format!(
          "✅ Debited {amount} 🥜 from <code>{tg_user_id}</code>, balance {}",
          applied.balance
        ),
        Some((
          Some(applied.transaction.user_id),
          json!({ "target": tg_user_id, "amount": amount }),
        )),
      )
    }

    AdminCommand::Ban(tg_user_id) => {
      let user = app.sv().user.set_blocked(tg_user_id, true).await?;
      (
        format!("🚫 User <code>{tg_user_id}</code> blocked"),
        Some((Some(user.id), json!({ "target": tg_user_id }))),
      )
    }

    AdminCommand::Unban(tg_user_id) => {
      let user = app.sv().user.set_blocked(tg_user_id, false).await?;
      (
        format!("✅ User <code>{tg_user_id}</code> unblocked"),
        Some((Some(user.id), json!({ "target": tg_user_id }))),
      )
    }

    AdminCommand::Grant { tg_user_id, achievement_id } => {
      let user = target(app, tg_user_id).await?;
      let txn = app.db.begin().await?;
      let grant =
        sv::Achievement::new(&txn).grant_manual(user.id, achievement_id).await?;
      txn.commit().await?;

      let reply = match &grant {
        Some(grant) => {
          let granted = std::slice::from_ref(grant);
          notify::grants(app.notifier.as_ref(), tg_user_id, granted).await;
          format!(
            "🏆 Granted {} to <code>{tg_user_id}</code>",
            utils::escape(&grant.achievement.name)
          )
        }
        None => {
          format!("ℹ️ <code>{tg_user_id}</code> already owns this achievement")
        }
      };
      let data =
        json!({ "target": tg_user_id, "achievement_id": achievement_id });
      (reply, Some((Some(user.id), data)))
    }

    AdminCommand::NewPromo { code, reward, max_uses } => {
      let max_uses = (max_uses > 0).then_some(max_uses);
      let promo = app.sv().promo.create(&code, reward, max_uses, None).await?;
      let uses =
        max_uses.map_or("unlimited".to_string(), |max| max.to_string());
      (
        format!(
          "🎟 Promo code <code>{}</code> created: {} 🥜, {uses} uses",
          utils::escape(&promo.code),
          promo.reward
        ),
        Some((None, json!({ "promo_id": promo.id, "code": promo.code }))),
      )
    }

    AdminCommand::NewAchievement { name, reward, condition_type, value } => {
      if condition_type.parse::<ConditionKind>().is_err() {
        let known: Vec<_> =
          ConditionKind::ALL.iter().map(|kind| kind.as_str()).collect();
        return Err(Error::InvalidArgs(format!(
          "unknown condition type {condition_type}, expected one of: {}",
          known.join(", ")
        )));
      }
      if reward < 0 {
        return Err(Error::InvalidArgs("reward must not be negative".into()));
      }

      let mut new = NewAchievement::new(name, reward, condition_type);
      if !value.is_empty() {
        new = new.value(value);
      }
      let achievement = app.sv().achievement.create(new).await?;
      if achievement.condition().is_none() {
        warn!(
          "Achievement #{} created with an incomplete condition",
          achievement.id
        );
      }
      (
        format!(
          "🏆 Achievement #{} <b>{}</b> created",
          achievement.id,
          utils::escape(&achievement.name)
        ),
        Some((None, json!({ "achievement_id": achievement.id }))),
      )
    }

    AdminCommand::NewProduct { price, name } => {
      let product = app.sv().product.create(name, None, price).await?;
      (
        format!(
          "🛒 Product #{} <b>{}</b> created for {} 🥜",
          product.id,
          utils::escape(&product.name),
          product.price
        ),
        Some((None, json!({ "product_id": product.id }))),
      )
    }

    AdminCommand::HideProduct(id) => product_on_sale(app, id, false).await?,
    AdminCommand::ShowProduct(id) => product_on_sale(app, id, true).await?,

    AdminCommand::Invoice { tg_user_id, amount, nuts_amount } => {
      if amount <= 0 || nuts_amount <= 0 {
        let msg = "invoice amounts must be positive";
        return Err(Error::InvalidArgs(msg.into()));
      }
      let user = target(app, tg_user_id).await?;
      let invoice =
        app.sv().payment.create_invoice(user.id, amount, nuts_amount).await?;

      notify::send(
        app.notifier.as_ref(),
        tg_user_id,
        &format!(
          "🧾 Invoice #{}: pay {amount} to receive {nuts_amount} 🥜",
          invoice.id
        ),
      )
      .await;
      (
        format!(
          "🧾 Invoice #{} issued to <code>{tg_user_id}</code>",
          invoice.id
        ),
        Some((
          Some(user.id),
          json!({
            "invoice_id": invoice.id,
            "amount": amount,
            "nuts_amount": nuts_amount,
          }),
        )),
      )
    }

    AdminCommand::Logs(arg) => (logs(app, arg.trim()).await?, None),

    AdminCommand::Recalc => {
      let report = cron::recalculate(app).await?;
      (
        format!(
          "🔄 Recalculated {} users: {} new achievements, {} failed",
          report.users,
          report.grants.len(),
          report.failed
        ),
        Some((
          None,
          json!({ "users": report.users, "grants": report.grants.len() }),
        )),
      )
    }
  };

  if let Some((user_id, mut data)) = audit {
    data["admin"] = json!(admin);
    data["command"] = json!(command);
    let message = Some(format!("/{command} by {admin}"));
    if let Err(err) = app
      .sv()
      .log
      .write(user_id, event::ADMIN_ACTION, message, Some(data))
      .await
    {
      warn!("Failed to record admin action /{command}: {err}");
    }
  }

  info!("Admin {admin} ran /{command}");
  Ok(reply)
}

async fn product_on_sale(
  app: &AppState,
  id: i32,
  active: bool,
) -> Result<(String, Option<(Option<i32>, Value)>)> {
  let product = app.sv().product.set_active(id, active).await?;
  let state = if active { "back on sale" } else { "hidden" };
  Ok((
    format!(
      "🛒 Product #{} <b>{}</b> {state}",
      product.id,
      utils::escape(&product.name)
    ),
    Some((None, json!({ "product_id": product.id, "active": active }))),
  ))
}

async fn target(app: &AppState, tg_user_id: i64) -> Result<user::Model> {
  app.sv().user.by_tg(tg_user_id).await?.ok_or(Error::UserNotFound)
}

async fn logs(app: &AppState, arg: &str) -> Result<String> {
  let user_id = match arg {
    "" => None,
    tg => {
      let tg_user_id = tg
        .parse::<i64>()
        .map_err(|_| Error::InvalidArgs("Usage: /logs [tg_id]".into()))?;
      Some(target(app, tg_user_id).await?.id)
    }
  };

  let entries = app.sv().log.recent(user_id, LOGS_LIMIT).await?;
  if entries.is_empty() {
    return Ok("📭 No events".into());
  }

  let mut text = String::from("📜 <b>Recent events</b>\n");
  for entry in entries {
    text.push_str(&format!(
      "\n<code>{}</code> {}",
      utils::format_date(entry.created_at),
      utils::escape(&entry.event_type)
    ));
    if let Some(user_id) = entry.user_id {
      text.push_str(&format!(" · user #{user_id}"));
    }
    if let Some(message) = &entry.message {
      text.push_str(&format!("\n  {}", utils::escape(message)));
    }
  }
  Ok(text)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{self, Outbox};

  async fn run(app: &AppState, cmd: AdminCommand) -> Result<String> {
    execute(app, testing::ADMIN, cmd).await
  }

  #[test]
  fn test_parse_achievement() {
    let input = "Golden_Acorn 50 secret_word open sesame";
    let (name, reward, kind, value) = parse_achievement(input.into()).unwrap();
    assert_eq!(name, "Golden Acorn");
    assert_eq!(reward, 50);
    assert_eq!(kind, "secret_word");
    assert_eq!(value, "open sesame");

    let (_, _, _, value) =
      parse_achievement("Hello 5 first_message_sent".into()).unwrap();
    assert!(value.is_empty());
    assert!(parse_achievement("Hello five none".into()).is_err());
    assert!(parse_achievement("Hello 5".into()).is_err());
  }

  #[test]
  fn test_parse_product() {
    let parsed = parse_product("120 Golden hat".into()).unwrap();
    assert_eq!(parsed, (120, "Golden hat".into()));
    assert!(parse_product("hat 120".into()).is_err());
    assert!(parse_product("120".into()).is_err());
  }

  #[tokio::test]
  async fn test_give_and_take() {
    let db = testing::db().await;
    let user = testing::user(&db, 42).await;
    let outbox = Outbox::new();
    let app = testing::app(db, outbox.clone());

    let give = AdminCommand::Give { tg_user_id: 42, amount: 100 };
    run(&app, give).await.unwrap();
    run(&app, AdminCommand::Take { tg_user_id: 42, amount: 30 }).await.unwrap();
    assert_eq!(testing::reload(&app.db, user.id).await.nuts_balance, 70);

    let overdraw = AdminCommand::Take { tg_user_id: 42, amount: 500 };
    let err = run(&app, overdraw).await.err().unwrap();
    assert!(matches!(err, Error::Nuts(_)));

    assert_eq!(outbox.sent_to(42).len(), 1);
    let log = sv::Log::new(&app.db);
    let actions = log.count(user.id, event::ADMIN_ACTION).await.unwrap();
    assert_eq!(actions, 2);
  }

  #[tokio::test]
  async fn test_ban_blocks_user() {
    let db = testing::db().await;
    let user = testing::user(&db, 42).await;
    let app = testing::app(db, Outbox::new());

    run(&app, AdminCommand::Ban(42)).await.unwrap();
    assert!(testing::reload(&app.db, user.id).await.is_blocked);
    run(&app, AdminCommand::Unban(42)).await.unwrap();
    assert!(!testing::reload(&app.db, user.id).await.is_blocked);

    let err =
      run(&app, AdminCommand::Ban(7)).await.err().unwrap();
    assert!(matches!(err, Error::UserNotFound));
  }

  #[tokio::test]
  async fn test_catalog_commands() {
    let db = testing::db().await;
    let user = testing::user(&db, 42).await;
    let outbox = Outbox::new();
    let app = testing::app(db, outbox.clone());

    let cmd = AdminCommand::NewAchievement {
      name: "Staff".into(),
      reward: 10,
      condition_type: "none".into(),
      value: String::new(),
    };
    run(&app, cmd).await.unwrap();

    let bogus = AdminCommand::NewAchievement {
      name: "Moon".into(),
      reward: 10,
      condition_type: "moon_phase".into(),
      value: String::new(),
    };
    assert!(run(&app, bogus).await.is_err());

    let staff = &app.sv().achievement.catalog(false).await.unwrap()[0];
    let grant =
      AdminCommand::Grant { tg_user_id: 42, achievement_id: staff.id };
    run(&app, grant.clone()).await.unwrap();
    let again = run(&app, grant).await.unwrap();
    assert!(again.contains("already owns"));
    assert_eq!(testing::reload(&app.db, user.id).await.nuts_balance, 10);
    assert_eq!(outbox.sent_to(42).len(), 1);

    run(&app, AdminCommand::NewPromo {
      code: "spring".into(),
      reward: 5,
      max_uses: 0,
    }).await.unwrap();
    let promo = app.sv().promo.by_code("SPRING").await.unwrap().unwrap();
    assert_eq!(promo.max_uses, None);

    run(&app, AdminCommand::NewProduct {
      price: 50,
      name: "Hat".into(),
    }).await.unwrap();
    assert_eq!(app.sv().product.active().await.unwrap().len(), 1);

    let logs = run(&app, AdminCommand::Logs("42".into())).await.unwrap();
    assert!(logs.contains(event::ACHIEVEMENT_GRANTED));
  }

  #[tokio::test]
  async fn test_hide_and_show_product() {
    let db = testing::db().await;
    let app = testing::app(db, Outbox::new());
    let hat = app.sv().product.create("Hat".into(), None, 50).await.unwrap();

    let reply =
      run(&app, AdminCommand::HideProduct(hat.id)).await.unwrap();
    assert!(reply.contains("hidden"));
    assert!(app.sv().product.active().await.unwrap().is_empty());

    run(&app, AdminCommand::ShowProduct(hat.id)).await.unwrap();
    assert_eq!(app.sv().product.active().await.unwrap().len(), 1);

    let err =
      run(&app, AdminCommand::HideProduct(404)).await.err().unwrap();
    assert!(matches!(err, Error::ProductNotFound));
  }

  #[tokio::test]
  async fn test_invoice_is_paid_by_webhook() {
    let db = testing::db().await;
    let user = testing::user(&db, 42).await;
    let outbox = Outbox::new();
    let app = testing::app(db, outbox.clone());

    let cmd =
      AdminCommand::Invoice { tg_user_id: 42, amount: 300, nuts_amount: 900 };
    run(&app, cmd).await.unwrap();
    assert_eq!(outbox.sent_to(42).len(), 1);

    let invoice = crate::entity::invoice::Entity::find()
      .one(&app.db).await.unwrap().unwrap();
    assert_eq!(invoice.user_id, user.id);
    assert_eq!(invoice.nuts_amount, 900);

    let top_up = sv::payment::TopUp {
      external_id: "pay-1".into(),
      tg_user_id: 42,
      amount: 300,
      nuts_amount: None,
      invoice_id: Some(invoice.id),
    };
    let credited = app.sv().payment.top_up(top_up, 1.0).await.unwrap();
    assert_eq!(credited.nuts_balance, 900);

    let unknown =
      AdminCommand::Invoice { tg_user_id: 7, amount: 1, nuts_amount: 1 };
    let err = run(&app, unknown).await.err().unwrap();
    assert!(matches!(err, Error::UserNotFound));
    let free =
      AdminCommand::Invoice { tg_user_id: 42, amount: 0, nuts_amount: 5 };
    assert!(run(&app, free).await.is_err());
  }
}
