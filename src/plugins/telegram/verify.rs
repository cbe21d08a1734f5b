use std::time::Instant;

use json::json;

use crate::{
  entity::user,
  notify,
  prelude::*,
  security,
  state::{AppState, Challenge},
  sv::{self, achievement::Grant, achievement::Trigger, log::event},
};

pub struct Confirmed {
  pub user: user::Model,
  pub first_time: bool,
  pub granted: Vec<Grant>,
  /// Referrer and what the confirmed referral earned them
  pub referrer: Option<(user::Model, Vec<Grant>)>,
}

pub async fn start(
  app: &AppState,
  user: &user::Model,
  username: &str,
) -> Result<String> {
  let username = username.trim();
  if username.is_empty() {
    return Err(Error::InvalidArgs("Usage: /verify <roblox_username>".into()));
  }

  let Some(account) = app.roblox.user_by_name(username).await? else {
    let msg = format!("Roblox user {username} does not exist");
    return Err(Error::InvalidArgs(msg));
  };

  let phrase = security::challenge_phrase(app.secret(), user.tg_user_id);
  app.challenges.insert(
    user.tg_user_id,
    Challenge {
      roblox_id: account.id,
      roblox_username: account.name.clone(),
      phrase: phrase.clone(),
      issued_at: Instant::now(),
    },
  );

  Ok(format!(
    "🔗 Linking <b>{}</b>\n\n\
    Put this phrase into your Roblox profile description:\n\
    <code>{phrase}</code>\n\n\
    Then send /check",
    utils::escape(&account.name)
  ))
}

pub async fn check(app: &AppState, user: &user::Model) -> Result<String> {
  let Some(challenge) = app.challenge(user.tg_user_id) else {
    let msg = "No pending verification, start with /verify";
    return Err(Error::InvalidArgs(msg.into()));
  };

  let description = app.roblox.description(challenge.roblox_id).await?;
  if !description.contains(&challenge.phrase) {
    return Ok(format!(
      "🔍 Phrase <code>{}</code> not found in the profile of {} yet",
      challenge.phrase,
      utils::escape(&challenge.roblox_username)
    ));
  }

  let (roblox_id, roblox_username) =
    (challenge.roblox_id, &challenge.roblox_username);
  let confirmed = confirm(&app.db, user.id, roblox_id, roblox_username).await?;
  app.challenges.remove(&user.tg_user_id);

  if let Some((referrer, granted)) = &confirmed.referrer {
    let mut text =
      String::from("🤝 Your referral verified their Roblox account!");
    if let Some(block) = notify::grants_text(granted) {
      text.push_str("\n\n");
      text.push_str(&block);
    }
    notify::send(app.notifier.as_ref(), referrer.tg_user_id, &text).await;
  }

  let head = if confirmed.first_time {
    let name = utils::escape(&challenge.roblox_username);
    format!("✅ Roblox account <b>{name}</b> linked")
  } else {
    "✅ Profile phrase checked".to_string()
  };
  Ok(super::command::with_grants(head, &confirmed.granted))
}

/// Marks the user verified for `roblox_id`, then settles the referral and
/// evaluates achievements
pub async fn confirm<C>(
  db: &C,
  user_id: i32,
  roblox_id: i64,
  roblox_username: &str,
) -> Result<Confirmed>
where
  C: ConnectionTrait + TransactionTrait,
{
  let txn = db.begin().await?;

  let users = sv::User::new(&txn);
  let before = users.by_id(user_id).await?.ok_or(Error::UserNotFound)?;
  if let Some(owner) = users.by_roblox(roblox_id).await?
    && owner.id != user_id
    && owner.verified
  {
    return Err(Error::InvalidArgs(
      "This Roblox account is already linked to another user".into(),
    ));
  }

  users.verify(user_id, roblox_id, roblox_username.to_string()).await?;
  let first_time = !(before.verified && before.roblox_id == Some(roblox_id));

  let log = sv::Log::new(&txn);
  let data =
    json!({ "roblox_id": roblox_id, "roblox_username": roblox_username });
  if first_time {
    log
      .write(
        Some(user_id),
        event::ROBLOX_VERIFIED,
        Some(format!("Linked Roblox account {roblox_username}")),
        Some(data.clone()),
      )
      .await?;
  }
  log
    .write(Some(user_id), event::PROFILE_PHRASE_CHECK, None, Some(data))
    .await?;

  // the referral is settled by the first link only
  let referrer_id = if first_time {
    sv::Referral::new(&txn).confirm(user_id).await?
  } else {
    None
  };

  let achievements = sv::Achievement::new(&txn);
  let granted =
    achievements.evaluate_and_grant(user_id, Trigger::Verified, None).await?;

  let referrer = match referrer_id {
    Some(referrer_id) => {
      let granted = achievements
        .evaluate_and_grant(referrer_id, Trigger::Referral, None)
        .await?;
      users.by_id(referrer_id).await?.map(|referrer| (referrer, granted))
    }
    None => None,
  };

  let user = users.by_id(user_id).await?.ok_or(Error::UserNotFound)?;
  txn.commit().await?;

  if first_time {
    info!("User {user_id} verified as Roblox {roblox_id}");
  }

  Ok(Confirmed { user, first_time, granted, referrer })
}
