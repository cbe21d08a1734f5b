//! Fixtures shared by the unit tests

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, Ordering},
};

use teloxide::Bot;

use crate::{
  config::Config,
  entity::{NutsSource, user},
  notify::Notifier,
  prelude::*,
  state::AppState,
  sv::{self, UserRef, nuts::Entry},
};

pub const SECRET: &[u8] = b"test-secret";
pub const ADMIN: i64 = 1000;

/// Fresh in-memory database with every migration applied
pub async fn db() -> DatabaseConnection {
  let db = Database::connect("sqlite::memory:").await.unwrap();
  migration::Migrator::up(&db, None).await.unwrap();
  db
}

/// App state over `db` with notifications captured by `notifier`
pub fn app(
  db: DatabaseConnection,
  notifier: Arc<dyn Notifier>,
) -> Arc<AppState> {
  let config = Config {
    hmac_secret: String::from_utf8_lossy(SECRET).into_owned(),
    admins: [ADMIN].into_iter().collect(),
    roblox_api: "http://127.0.0.1:9".into(),
    ..Config::default()
  };
  let bot = Bot::new("0:test");
  Arc::new(AppState::with_parts(db, bot, notifier, config).unwrap())
}

pub async fn user(db: &DatabaseConnection, tg_user_id: i64) -> user::Model {
  sv::User::new(db).get_or_create(tg_user_id, None).await.unwrap()
}

/// User funded through the ledger, so balance and history agree
pub async fn user_with_nuts(
  db: &DatabaseConnection,
  tg_user_id: i64,
  nuts: i64,
) -> user::Model {
  let user = user(db, tg_user_id).await;
  if nuts > 0 {
    sv::Nuts::new(db)
      .add_nuts(UserRef::Id(user.id), nuts, Entry::new(NutsSource::Admin))
      .await
      .unwrap();
  }
  reload(db, user.id).await
}

/// Verified user linked to a Roblox account
pub async fn player(
  db: &DatabaseConnection,
  tg_user_id: i64,
  roblox_id: i64,
) -> user::Model {
  let user = user(db, tg_user_id).await;
  let name = format!("player{roblox_id}");
  sv::User::new(db).verify(user.id, roblox_id, name).await.unwrap()
}

pub async fn reload(db: &DatabaseConnection, user_id: i32) -> user::Model {
  sv::User::new(db).by_id(user_id).await.unwrap().unwrap()
}

/// Records every message instead of talking to Telegram
#[derive(Default)]
pub struct Outbox {
  pub sent: Mutex<Vec<(i64, String)>>,
  pub broken: AtomicBool,
}

impl Outbox {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn broken() -> Arc<Self> {
    let outbox = Self::default();
    outbox.broken.store(true, Ordering::Relaxed);
    Arc::new(outbox)
  }

  pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
    self
      .sent
      .lock()
      .unwrap()
      .iter()
      .filter(|(to, _)| *to == chat_id)
      .map(|(_, text)| text.clone())
      .collect()
  }
}

#[async_trait]
impl Notifier for Outbox {
  async fn notify(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
    if self.broken.load(Ordering::Relaxed) {
      anyhow::bail!("chat {chat_id} is unreachable");
    }
    self.sent.lock().unwrap().push((chat_id, text.to_string()));
    Ok(())
  }
}
