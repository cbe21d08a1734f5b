use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Nuts {
  #[error("Amount must be positive, got {0}")]
  InvalidAmount(i64),
  #[error("User not found")]
  UserNotFound,
  #[error("Insufficient nuts: balance {balance}, requested {amount}")]
  InsufficientBalance { balance: i64, amount: i64 },
}

#[derive(Debug, Error)]
pub enum Promo {
  #[error("Promo code not found")]
  NotFound,
  #[error("Promo code is not active")]
  Inactive,
  #[error("Promo code has no uses left")]
  Exhausted,
  #[error("Promo code already redeemed")]
  Claimed,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("Database error: {0}")]
  Database(#[from] sea_orm::DbErr),

  #[error(transparent)]
  Nuts(#[from] Nuts),

  #[error(transparent)]
  Promo(#[from] Promo),

  #[error("User not found")]
  UserNotFound,

  #[error("User is blocked")]
  UserBlocked,

  #[error("Product not found")]
  ProductNotFound,

  #[error("Achievement not found")]
  AchievementNotFound,

  #[error("Achievement is not owned")]
  AchievementNotOwned,

  #[error("Invalid signature")]
  InvalidSignature,

  #[error("Missing Idempotency-Key header")]
  MissingIdempotencyKey,

  #[error("Request with this idempotency key is still in progress")]
  IdempotencyConflict,

  #[error("Invalid arguments: {0}")]
  InvalidArgs(String),

  #[error("Roblox API error: {0}")]
  Roblox(String),

  #[error("Internal error: {0}")]
  Internal(String),
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::Nuts(Nuts::UserNotFound)
      | Error::UserNotFound
      | Error::ProductNotFound
      | Error::AchievementNotFound
      | Error::Promo(Promo::NotFound) => StatusCode::NOT_FOUND,
      Error::Nuts(_)
      | Error::Promo(_)
      | Error::AchievementNotOwned
      | Error::MissingIdempotencyKey
      | Error::InvalidArgs(_) => StatusCode::BAD_REQUEST,
      Error::UserBlocked => StatusCode::FORBIDDEN,
      Error::InvalidSignature => StatusCode::UNAUTHORIZED,
      Error::IdempotencyConflict => StatusCode::CONFLICT,
      Error::Roblox(_) => StatusCode::BAD_GATEWAY,
      Error::Database(_) | Error::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  /// Text safe to show to a bot user
  pub fn user_message(&self) -> String {
    match self {
      Error::Database(_) | Error::Internal(_) => {
        "Something went wrong, try again later".into()
      }
      Error::Nuts(Nuts::InsufficientBalance { balance, amount }) => {
        format!("Not enough nuts: you have {balance}, need {amount}")
      }
      Error::Roblox(_) => "Roblox is not responding, try again later".into(),
      other => other.to_string(),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      Error::Database(err) => {
        tracing::error!("Database error: {err}");
        "Database error".to_string()
      }
      Error::Internal(err) => {
        tracing::error!("Internal error: {err}");
        "Internal error".to_string()
      }
      other => other.to_string(),
    };

    let body = json::json!({
      "success": false,
      "error": message,
    });

    (status, Json(body)).into_response()
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
