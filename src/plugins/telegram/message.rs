use std::sync::Arc;

use json::json;
use teloxide::prelude::*;

use super::ReplyBot;
use crate::{
  entity::user,
  notify,
  prelude::*,
  state::AppState,
  sv::{self, achievement::Grant, achievement::Trigger, log::event},
};

pub async fn handle(
  app: Arc<AppState>,
  bot: ReplyBot,
  user: user::Model,
  text: &str,
) -> ResponseResult<()> {
  match process(&app.db, &user, text).await {
    Ok(grants) => {
      if let Some(text) = notify::grants_text(&grants) {
        bot.reply_html(text).await?;
      }
    }
    Err(err) => error!("Failed to process message from {}: {err}", user.id),
  }
  Ok(())
}

/// Records the first message and tries the text as a secret word
pub async fn process<C>(
  db: &C,
  user: &user::Model,
  text: &str,
) -> Result<Vec<Grant>>
where
  C: ConnectionTrait + TransactionTrait,
{
  let mut grants = Vec::new();
  let achievements = sv::Achievement::new(db);

  let log = sv::Log::new(db);
  if !log.exists(user.id, event::USER_MESSAGE_SEEN).await? {
    let preview: String = text.chars().take(64).collect();
    log
      .write(
        Some(user.id),
        event::USER_MESSAGE_SEEN,
        Some("First message".into()),
        Some(json!({ "text": preview })),
      )
      .await?;
    grants.extend(
      achievements.evaluate_and_grant(user.id, Trigger::Message, None).await?,
    );
  }

  grants.extend(achievements.grant_secret_word(user.id, text).await?);
  Ok(grants)
}
