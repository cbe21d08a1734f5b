use std::sync::Arc;

use teloxide::{
  prelude::*,
  types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use super::{ReplyBot, command};
use crate::{
  entity::{product, user},
  prelude::*,
  state::AppState,
};

/// Callback data enum - provides type-safe callback handling
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
  Profile,
  Achievements,
  Shop,
  Top,
  Referral,
  Buy(i32),
  Back,
}

impl Callback {
  /// Serialize callback to string for Telegram API
  pub fn to_data(&self) -> String {
    match self {
      Callback::Profile => "profile".to_string(),
      Callback::Achievements => "achievements".to_string(),
      Callback::Shop => "shop".to_string(),
      Callback::Top => "top".to_string(),
      Callback::Referral => "referral".to_string(),
      Callback::Buy(id) => format!("buy:{id}"),
      Callback::Back => "back".to_string(),
    }
  }

  /// Parse callback from string received from Telegram API
  pub fn from_data(data: &str) -> Option<Self> {
    match data {
      "profile" => Some(Callback::Profile),
      "achievements" => Some(Callback::Achievements),
      "shop" => Some(Callback::Shop),
      "top" => Some(Callback::Top),
      "referral" => Some(Callback::Referral),
      "back" => Some(Callback::Back),
      _ => data.strip_prefix("buy:")?.parse().ok().map(Callback::Buy),
    }
  }
}

fn button(text: impl Into<String>, callback: Callback) -> InlineKeyboardButton {
  InlineKeyboardButton::callback(text, callback.to_data())
}

pub fn main_menu() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![
      button("👤 Profile", Callback::Profile),
      button("🏆 Achievements", Callback::Achievements),
    ],
    vec![button("🛒 Shop", Callback::Shop), button("📊 Top", Callback::Top)],
    vec![button("🤝 Referrals", Callback::Referral)],
  ])
}

pub fn back_keyboard() -> InlineKeyboardMarkup {
  let back = button("« Back to Menu", Callback::Back);
  InlineKeyboardMarkup::new(vec![vec![back]])
}

pub fn shop_keyboard(products: &[product::Model]) -> InlineKeyboardMarkup {
  let mut rows: Vec<_> = products
    .iter()
    .map(|product| {
      vec![button(
        format!("Buy {} · {} 🥜", product.name, product.price),
        Callback::Buy(product.id),
      )]
    })
    .collect();
  rows.push(vec![button("« Back to Menu", Callback::Back)]);
  InlineKeyboardMarkup::new(rows)
}

pub async fn handle(
  app: Arc<AppState>,
  bot: ReplyBot,
  user: user::Model,
  data: &str,
) -> ResponseResult<()> {
  let Some(callback) = Callback::from_data(data) else {
    return Ok(());
  };

  let result = match callback {
    Callback::Profile => command::profile(&app, &user).await,
    Callback::Achievements => command::achievements(&app, &user).await,
    Callback::Top => command::top(&app).await,
    Callback::Referral => command::referral(&app, &user).await,
    Callback::Shop => match command::shop(&app).await {
      Ok((text, keyboard)) => {
        return bot.edit_with_keyboard(text, keyboard).await;
      }
      Err(err) => Err(err),
    },
    Callback::Buy(id) => {
      // purchases are answered with a new message so the shop stays open
      return bot.reply_result(command::buy(&app, &user, id).await).await;
    }
    Callback::Back => {
      return bot.edit_with_keyboard(command::welcome(), main_menu()).await;
    }
  };

  match result {
    Ok(text) => bot.edit_with_keyboard(text, back_keyboard()).await,
    Err(err) => {
      let text = format!("❌ {}", utils::escape(&err.user_message()));
      bot.edit_with_keyboard(text, back_keyboard()).await
    }
  }
}
