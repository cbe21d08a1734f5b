mod admin;
mod callback;
mod command;
mod message;
mod verify;

use std::sync::Arc;

use admin::AdminCommand;
use command::Command;
use teloxide::{
  Bot,
  dispatching::{Dispatcher, HandlerExt, UpdateFilterExt},
  prelude::*,
  types::{
    CallbackQuery, ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode,
    Update, User,
  },
};
use tokio_util::sync::CancellationToken;

use crate::{entity::user, prelude::*, state::AppState};

pub struct Plugin;

#[async_trait::async_trait]
impl super::Plugin for Plugin {
  async fn start(
    &self,
    app: Arc<AppState>,
    shutdown: CancellationToken,
  ) -> anyhow::Result<()> {
    run_bot(app, shutdown).await;
    Ok(())
  }
}

pub async fn run_bot(app: Arc<AppState>, shutdown: CancellationToken) {
  info!("Starting Telegram bot...");

  let bot = app.bot.clone();

  let is_admin = {
    let app = app.clone();
    move |msg: Message| {
      let from = msg.from.as_ref();
      from.is_some_and(|from| app.config.is_admin(from.id.0 as i64))
    }
  };

  let handler = dptree::entry()
    .branch(
      Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint({
          let app = app.clone();
          move |bot: Bot, msg: Message, cmd: Command| {
            let app = app.clone();
            async move {
              let Some((bot, user)) = enter(&app, bot, &msg).await? else {
                return Ok(());
              };
              command::handle(app, bot, user, cmd).await
            }
          }
        }))
        .branch(
          dptree::filter(is_admin)
            .filter_command::<AdminCommand>()
            .endpoint({
              let app = app.clone();
              move |bot: Bot, msg: Message, cmd: AdminCommand| {
                let app = app.clone();
                async move {
                  let Some((bot, _)) = enter(&app, bot, &msg).await? else {
                    return Ok(());
                  };
                  admin::handle(app, bot, cmd).await
                }
              }
            }),
        )
        .branch(dptree::endpoint({
          let app = app.clone();
          move |bot: Bot, msg: Message| {
            let app = app.clone();
            async move {
              let Some(text) = msg.text().map(str::to_owned) else {
                return Ok(());
              };
              // unknown commands are not chat messages
              if text.starts_with('/') {
                return Ok(());
              }
              let Some((bot, user)) = enter(&app, bot, &msg).await? else {
                return Ok(());
              };
              message::handle(app, bot, user, &text).await
            }
          }
        })),
    )
    .branch(Update::filter_callback_query().endpoint({
      let app = app.clone();
      move |bot: Bot, query: CallbackQuery| {
        let app = app.clone();
        callback_handle(app, bot, query)
      }
    }));

  let mut dispatcher = Dispatcher::builder(bot, handler).build();

  let token = dispatcher.shutdown_token();
  tokio::spawn(async move {
    shutdown.cancelled().await;
    if let Ok(done) = token.shutdown() {
      done.await;
    }
  });

  dispatcher.dispatch().await;
}

fn display_name(from: &User) -> Option<String> {
  from.username.clone().or_else(|| Some(from.first_name.clone()))
}

/// Registers the sender and refuses blocked users
async fn enter(
  app: &AppState,
  bot: Bot,
  msg: &Message,
) -> ResponseResult<Option<(ReplyBot, user::Model)>> {
  let Some(from) = msg.from.as_ref() else {
    return Ok(None);
  };

  let bot = ReplyBot::new(bot, from.id.0 as i64, msg.chat.id, msg.id);
  let name = display_name(from);
  let user = match app.sv().user.get_or_create(bot.user_id, name).await {
    Ok(user) => user,
    Err(err) => {
      error!("Failed to load user {}: {err}", bot.user_id);
      bot.reply_html(format!("❌ {}", err.user_message())).await?;
      return Ok(None);
    }
  };

  if user.is_blocked {
    bot.reply_html("⛔ Your account is blocked.").await?;
    return Ok(None);
  }

  Ok(Some((bot, user)))
}

async fn callback_handle(
  app: Arc<AppState>,
  bot: Bot,
  query: CallbackQuery,
) -> ResponseResult<()> {
  if let Some(data) = query.data
    && let Some(msg) = query.message.as_ref()
  {
    let bot =
      ReplyBot::new(bot, query.from.id.0 as i64, msg.chat().id, msg.id());

    // answer callback to remove loading state
    bot.inner.answer_callback_query(query.id.clone()).await?;

    let name = display_name(&query.from);
    let user = match app.sv().user.get_or_create(bot.user_id, name).await {
      Ok(user) if !user.is_blocked => user,
      Ok(_) => return Ok(()),
      Err(err) => {
        error!("Failed to load user {}: {err}", bot.user_id);
        return Ok(());
      }
    };

    callback::handle(app, bot, user, &data).await
  } else {
    Ok(())
  }
}

#[derive(Debug, Clone)]
struct ReplyBot {
  inner: Bot,
  pub user_id: i64,
  pub chat_id: ChatId,
  pub message_id: MessageId,
}

impl ReplyBot {
  pub fn new(
    inner: Bot,
    user_id: i64,
    chat_id: ChatId,
    message_id: MessageId,
  ) -> Self {
    Self { inner, user_id, chat_id, message_id }
  }

  async fn reply_html(
    &self,
    text: impl Into<String>,
  ) -> ResponseResult<Message> {
    self
      .inner
      .send_message(self.chat_id, text.into())
      .parse_mode(ParseMode::Html)
      .await
  }

  /// Sends long text as several messages
  async fn reply_html_chunked(
    &self,
    text: impl Into<String>,
  ) -> ResponseResult<()> {
    for chunk in utils::chunk_message(&text.into(), 0) {
      self
        .inner
        .send_message(self.chat_id, chunk)
        .parse_mode(ParseMode::Html)
        .await?;
    }
    Ok(())
  }

  async fn reply_with_keyboard(
    &self,
    text: impl Into<String>,
    keyboard: InlineKeyboardMarkup,
  ) -> ResponseResult<Message> {
    self
      .inner
      .send_message(self.chat_id, text.into())
      .parse_mode(ParseMode::Html)
      .reply_markup(keyboard)
      .await
  }

  pub async fn edit_with_keyboard(
    &self,
    text: impl Into<String>,
    keyboard: InlineKeyboardMarkup,
  ) -> ResponseResult<()> {
    self
      .inner
      .edit_message_text(self.chat_id, self.message_id, text.into())
      .parse_mode(ParseMode::Html)
      .reply_markup(keyboard)
      .await?;
    Ok(())
  }

  /// Replies with the text or the user-facing error
  async fn reply_result(&self, result: Result<String>) -> ResponseResult<()> {
    match result {
      Ok(text) => self.reply_html_chunked(text).await,
      Err(err) => {
        if matches!(err, Error::Database(_) | Error::Internal(_)) {
          error!("Command failed for {}: {err}", self.user_id);
        }
        let text = utils::escape(&err.user_message());
        self.reply_html(format!("❌ {text}")).await?;
        Ok(())
      }
    }
  }
}
