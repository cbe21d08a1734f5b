//! Minimal Roblox users API client

use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RobloxUser {
  pub id: i64,
  pub name: String,
  #[serde(rename = "displayName", default)]
  pub display_name: String,
}

#[derive(Debug, Serialize)]
struct UsernamesReq<'a> {
  usernames: [&'a str; 1],
  #[serde(rename = "excludeBannedUsers")]
  exclude_banned_users: bool,
}

#[derive(Debug, Deserialize)]
struct UsernamesRes {
  #[serde(default)]
  data: Vec<RobloxUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileRes {
  #[serde(default)]
  description: String,
}

pub struct Roblox {
  client: Client,
  base: String,
  by_name: DashMap<String, (RobloxUser, Instant)>,
}

impl Roblox {
  pub fn new(base: &str) -> anyhow::Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("nutshop/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(10))
      .build()
      .context("Failed to build Roblox HTTP client")?;

    Ok(Self {
      client,
      base: base.trim_end_matches('/').to_string(),
      by_name: DashMap::new(),
    })
  }

  /// Resolves a username, cached for an hour
  pub async fn user_by_name(
    &self,
    username: &str,
  ) -> Result<Option<RobloxUser>> {
    let key = username.trim().to_lowercase();
    if key.is_empty() {
      return Ok(None);
    }

    if let Some(entry) = self.by_name.get(&key)
      && entry.1.elapsed() < CACHE_TTL
    {
      return Ok(Some(entry.0.clone()));
    }

    let url = format!("{}/v1/usernames/users", self.base);
    let res: UsernamesRes = self
      .client
      .post(&url)
      .json(&UsernamesReq {
        usernames: [username.trim()],
        exclude_banned_users: true,
      })
      .send()
      .await
      .and_then(|res| res.error_for_status())
      .map_err(|err| Error::Roblox(err.to_string()))?
      .json()
      .await
      .map_err(|err| Error::Roblox(err.to_string()))?;

    let user = res.data.into_iter().next();
    if let Some(user) = &user {
      self.by_name.insert(key, (user.clone(), Instant::now()));
    }
    Ok(user)
  }

  /// Profile description, never cached
  pub async fn description(&self, roblox_id: i64) -> Result<String> {
    let url = format!("{}/v1/users/{roblox_id}", self.base);
    let res: ProfileRes = self
      .client
      .get(&url)
      .send()
      .await
      .and_then(|res| res.error_for_status())
      .map_err(|err| Error::Roblox(err.to_string()))?
      .json()
      .await
      .map_err(|err| Error::Roblox(err.to_string()))?;
    Ok(res.description)
  }

  pub fn gc(&self) {
    self.by_name.retain(|_, (_, at)| at.elapsed() < CACHE_TTL);
  }
}
