use std::sync::Arc;

use teloxide::{prelude::*, utils::command::BotCommands};

use super::{ReplyBot, admin::AdminCommand, callback, verify};
use crate::{
  entity::{TransactionType, user},
  notify,
  prelude::*,
  state::AppState,
  sv::achievement::Grant,
};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
  #[command(description = "open the main menu")]
  Start(String),
  #[command(description = "show this message")]
  Help,
  #[command(description = "balance and recent nuts movements")]
  Balance,
  #[command(description = "your profile")]
  Profile,
  #[command(description = "owned and available achievements")]
  Achievements,
  #[command(description = "show an owned achievement, `none` to clear")]
  Select(String),
  #[command(description = "link a Roblox account")]
  Verify(String),
  #[command(description = "finish Roblox verification")]
  Check,
  #[command(description = "redeem a promo code")]
  Redeem(String),
  #[command(description = "products for nuts")]
  Shop,
  #[command(description = "buy a product by id")]
  Buy(String),
  #[command(description = "leaderboard")]
  Top,
  #[command(description = "your referral code")]
  Referral,
}

pub fn welcome() -> &'static str {
  "🥜 <b>Welcome to the Nut Shop!</b>\n\n\
  Earn nuts by playing, topping up and unlocking achievements.\n\
  Use the buttons below or /help."
}

pub async fn handle(
  app: Arc<AppState>,
  bot: ReplyBot,
  user: user::Model,
  cmd: Command,
) -> ResponseResult<()> {
  let sv = app.sv();

  let result: Result<String> = match cmd {
    Command::Start(code) => {
      let code = code.trim();
      let mut text = welcome().to_string();
      if !code.is_empty() {
        match sv.referral.register(user.id, code).await {
          Ok(Some(_)) => text.push_str(
            "\n\n🤝 Referral code accepted. \
            It counts once you verify your Roblox account.",
          ),
          Ok(None) => {}
          Err(err) => {
            warn!("Referral registration failed for {}: {err}", user.id)
          }
        }
      }
      bot.reply_with_keyboard(text, callback::main_menu()).await?;
      return Ok(());
    }

    Command::Help => {
      let mut text = Command::descriptions().to_string();
      if app.config.is_admin(bot.user_id) {
        text.push_str("\n\n");
        text.push_str(&AdminCommand::descriptions().to_string());
      }
      bot.reply_html_chunked(utils::escape(&text)).await?;
      return Ok(());
    }

    Command::Balance => balance(&app, &user).await,
    Command::Profile => profile(&app, &user).await,
    Command::Achievements => achievements(&app, &user).await,

    Command::Select(arg) => {
      async {
        let arg = arg.trim();
        let target = match arg {
          "none" | "0" => None,
          id => Some(id.parse::<i32>().map_err(|_| {
            Error::InvalidArgs("Usage: /select <achievement_id | none>".into())
          })?),
        };
        sv.achievement.select(user.id, target).await?;
        Ok(match target {
          Some(_) => "✅ Achievement shown on your profile".to_string(),
          None => "✅ Profile badge cleared".to_string(),
        })
      }
      .await
    }

    Command::Verify(username) => verify::start(&app, &user, &username).await,
    Command::Check => verify::check(&app, &user).await,

    Command::Redeem(code) => {
      async {
        let code = code.trim();
        if code.is_empty() {
          return Err(Error::InvalidArgs("Usage: /redeem <code>".into()));
        }
        let redeemed = sv.promo.redeem(user.id, code).await?;
        Ok(with_grants(
          format!(
            "🎁 Promo code redeemed: +{} 🥜\nBalance: {} 🥜",
            redeemed.promo.reward, redeemed.nuts_balance
          ),
          &redeemed.granted,
        ))
      }
      .await
    }

    Command::Shop => {
      match shop(&app).await {
        Ok((text, keyboard)) => {
          bot.reply_with_keyboard(text, keyboard).await?;
        }
        Err(err) => bot.reply_result(Err(err)).await?,
      }
      return Ok(());
    }

    Command::Buy(id) => match id.trim().parse::<i32>() {
      Ok(id) => buy(&app, &user, id).await,
      Err(_) => Err(Error::InvalidArgs("Usage: /buy <product_id>".into())),
    },

    Command::Top => top(&app).await,
    Command::Referral => referral(&app, &user).await,
  };

  bot.reply_result(result).await
}

/// Appends the "new achievements" block when there is one
pub fn with_grants(mut text: String, grants: &[Grant]) -> String {
  if let Some(block) = notify::grants_text(grants) {
    text.push_str("\n\n");
    text.push_str(&block);
  }
  text
}

pub async fn balance(app: &AppState, user: &user::Model) -> Result<String> {
  let history = app.sv().nuts.history(user.id, 5).await?;

  let mut text = format!(
    "💰 <b>Balance</b>\n\nNuts: {} 🥜\nBalance: {}",
    user.nuts_balance, user.balance
  );

  if !history.is_empty() {
    text.push_str("\n\n<b>Recent:</b>");
    for entry in history {
      let sign = match entry.transaction_type {
        TransactionType::Credit => '+',
        TransactionType::Debit => '-',
      };
      text.push_str(&format!(
        "\n{sign}{} · {} · {}",
        entry.amount,
        utils::escape(entry.reason.as_deref().unwrap_or("-")),
        utils::format_date(entry.created_at)
      ));
    }
  }
  Ok(text)
}

pub async fn profile(app: &AppState, user: &user::Model) -> Result<String> {
  let sv = app.sv();
  let owned = sv.achievement.owned(user.id).await?;

  let badge = user
    .selected_achievement_id
    .and_then(|id| owned.iter().find(|(_, a)| a.id == id))
    .map(|(_, a)| format!("🏅 {}\n", utils::escape(&a.name)))
    .unwrap_or_default();

  let roblox = match (&user.roblox_username, user.verified) {
    (Some(name), true) => format!("✅ {}", utils::escape(name)),
    _ => "not linked, use /verify".to_string(),
  };

  Ok(format!(
    "👤 <b>Profile</b>\n{badge}\n\
    <b>ID:</b> <code>{}</code>\n\
    <b>Roblox:</b> {roblox}\n\
    <b>Nuts:</b> {} 🥜\n\
    <b>Balance:</b> {}\n\
    <b>Achievements:</b> {}\n\
    <b>Registered:</b> {}",
    user.tg_user_id,
    user.nuts_balance,
    user.balance,
    owned.len(),
    utils::format_date(user.created_at),
  ))
}

pub async fn achievements(
  app: &AppState,
  user: &user::Model,
) -> Result<String> {
  let sv = app.sv();
  let owned = sv.achievement.owned(user.id).await?;
  let catalog = sv.achievement.catalog(true).await?;

  let mut text =
    format!("🏆 <b>Achievements ({}/{})</b>\n", owned.len(), catalog.len());
  for (earned, achievement) in &owned {
    text.push_str(&format!(
      "\n✅ <b>{}</b> #{} · {}",
      utils::escape(&achievement.name),
      achievement.id,
      utils::format_date(earned.earned_at)
    ));
  }

  let is_owned = |id: i32| owned.iter().any(|(_, known)| known.id == id);
  for achievement in catalog.iter().filter(|a| !is_owned(a.id)) {
    text.push_str(&format!("\n🔒 {}", utils::escape(&achievement.name)));
    if let Some(description) = &achievement.description {
      text.push_str(&format!(" · {}", utils::escape(description)));
    }
    if achievement.reward > 0 {
      text.push_str(&format!(" (+{} 🥜)", achievement.reward));
    }
  }

  if !owned.is_empty() {
    text.push_str("\n\nShow one on your profile with /select &lt;id&gt;");
  }
  Ok(text)
}

pub async fn shop(
  app: &AppState,
) -> Result<(String, teloxide::types::InlineKeyboardMarkup)> {
  let products = app.sv().product.active().await?;

  if products.is_empty() {
    let text = "🛒 The shop is empty for now.".into();
    return Ok((text, callback::back_keyboard()));
  }

  let mut text = String::from("🛒 <b>Shop</b>\n");
  for product in &products {
    text.push_str(&format!(
      "\n<b>#{}</b> {} · {} 🥜",
      product.id,
      utils::escape(&product.name),
      product.price
    ));
    if let Some(description) = &product.description {
      text.push_str(&format!("\n<i>{}</i>", utils::escape(description)));
    }
  }
  Ok((text, callback::shop_keyboard(&products)))
}

pub async fn buy(
  app: &AppState,
  user: &user::Model,
  product_id: i32,
) -> Result<String> {
  let bought = app.sv().purchase.buy(user.id, product_id).await?;
  Ok(with_grants(
    format!(
      "✅ Bought <b>{}</b> for {} 🥜\nBalance: {} 🥜",
      utils::escape(&bought.product.name),
      bought.product.price,
      bought.nuts_balance
    ),
    &bought.granted,
  ))
}

pub async fn top(app: &AppState) -> Result<String> {
  let top = app.leaderboard(10).await?;
  if top.is_empty() {
    return Ok("📊 Nobody is on the leaderboard yet.".into());
  }

  let mut text = String::from("📊 <b>Top nut collectors</b>\n");
  for (place, user) in top.iter().enumerate() {
    let name = user
      .roblox_username
      .as_deref()
      .or(user.username.as_deref())
      .map(utils::escape)
      .unwrap_or_else(|| format!("user {}", user.id));
    let (place, nuts) = (place + 1, user.nuts_balance);
    text.push_str(&format!("\n{place}. {name} · {nuts} 🥜"));
  }
  Ok(text)
}

pub async fn referral(app: &AppState, user: &user::Model) -> Result<String> {
  let sv = app.sv();
  let confirmed = sv.referral.count_confirmed(user.id).await?;
  let pending = sv.referral.count_pending(user.id).await?;
  let earned = sv.referral.earned(user.id).await?;

  Ok(format!(
    "🤝 <b>Referrals</b>\n\n\
    Your code: <code>{}</code>\n\
    Friends start the bot with <code>/start {}</code>.\n\
    You get {}% of every top-up of a verified friend.\n\n\
    Confirmed: {confirmed}\nPending: {pending}\nEarned: {earned} 🥜",
    user.referral_code,
    user.referral_code,
    crate::sv::referral::REFERRAL_BONUS_PERCENT,
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    sv::{self, achievement::NewAchievement},
    testing::{self, Outbox},
  };

  #[tokio::test]
  async fn test_profile_shows_selected_badge() {
    let app = testing::app(testing::db().await, Outbox::new());
    let user = testing::user_with_nuts(&app.db, 1, 42).await;
    let sv = sv::Achievement::new(&app.db);
    let badge =
      sv.create(NewAchievement::new("Nut <King>", 0, "none")).await.unwrap();
    sv.evaluate_and_grant(user.id, sv::achievement::Trigger::Manual, None)
      .await
      .unwrap();
    let user = sv.select(user.id, Some(badge.id)).await.unwrap();

    let text = profile(&app, &user).await.unwrap();
    assert!(text.contains("🏅 Nut &lt;King&gt;"));
    assert!(text.contains("<b>Nuts:</b> 42"));
    assert!(text.contains("not linked"));
  }

  #[tokio::test]
  async fn test_balance_lists_recent_movements() {
    let app = testing::app(testing::db().await, Outbox::new());
    let user = testing::user_with_nuts(&app.db, 1, 300).await;
    let product =
      app.sv().product.create("Hat".into(), None, 120).await.unwrap();

    let text = buy(&app, &user, product.id).await.unwrap();
    assert!(text.contains("Balance: 180"));

    let user = testing::reload(&app.db, user.id).await;
    let text = balance(&app, &user).await.unwrap();
    assert!(text.contains("-120 · Purchase: Hat"));
    assert!(text.contains("+300"));
  }

  #[tokio::test]
  async fn test_top_prefers_roblox_names() {
    let app = testing::app(testing::db().await, Outbox::new());
    let player = testing::player(&app.db, 1, 9).await;
    testing::user_with_nuts(&app.db, 2, 5).await;
    sv::Nuts::new(&app.db)
      .add_nuts(
        sv::UserRef::Id(player.id),
        50,
        sv::nuts::Entry::new(crate::entity::NutsSource::Admin),
      )
      .await
      .unwrap();

    let text = top(&app).await.unwrap();
    let first = text.lines().find(|line| line.starts_with("1.")).unwrap();
    assert_eq!(first, "1. player9 · 50 🥜");
  }
}
