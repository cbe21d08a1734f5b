//! Signature check and idempotency wrapper for the signed endpoints

use std::future::Future;

use axum::{
  Json,
  body::Bytes,
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
};
use json::Value;
use serde::de::DeserializeOwned;

use crate::{prelude::*, security, state::AppState, sv::idempotency::Begin};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  headers
    .get(name)
    .and_then(|value| value.to_str().ok())
    .map(str::trim)
    .filter(|value| !value.is_empty())
}

/// Verifies, deduplicates and runs `run` on the decoded body.
/// Only successful responses are stored for replay.
pub async fn signed<T, F, Fut>(
  app: &AppState,
  endpoint: &'static str,
  headers: &HeaderMap,
  body: &Bytes,
  run: F,
) -> Response
where
  T: DeserializeOwned,
  F: FnOnce(T) -> Fut,
  Fut: Future<Output = Result<Value>>,
{
  let signature = header(headers, SIGNATURE_HEADER).unwrap_or_default();
  if !security::verify(app.secret(), body, signature) {
    warn!("Rejected {endpoint}: bad signature");
    return Error::InvalidSignature.into_response();
  }

  let Some(key) = header(headers, IDEMPOTENCY_HEADER) else {
    return Error::MissingIdempotencyKey.into_response();
  };

  let req: T = match json::from_slice(body) {
    Ok(req) => req,
    Err(err) => return Error::InvalidArgs(err.to_string()).into_response(),
  };

  let keys = app.sv().idempotency;
  match keys.begin(key, endpoint, app.config.idempotency_ttl).await {
    Ok(Begin::Fresh) => {}
    Ok(Begin::Replay { status, body }) => {
      debug!("Replaying {endpoint} for key `{key}`");
      let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
      return (status, Json(body)).into_response();
    }
    Err(err) => return err.into_response(),
  }

  match run(req).await {
    Ok(body) => match keys.complete(key, StatusCode::OK.as_u16(), &body).await {
      Ok(()) => (StatusCode::OK, Json(body)).into_response(),
      Err(err) => {
        error!("Failed to store response for key `{key}`: {err}");
        release(app, key).await;
        err.into_response()
      }
    },
    Err(err) => {
      release(app, key).await;
      err.into_response()
    }
  }
}

async fn release(app: &AppState, key: &str) {
  if let Err(err) = app.sv().idempotency.release(key).await {
    error!("Failed to release key `{key}`: {err}");
  }
}
