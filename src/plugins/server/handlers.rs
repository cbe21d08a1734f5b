use std::sync::Arc;

use axum::{
  Json,
  body::Bytes,
  extract::State,
  http::HeaderMap,
  response::Response,
};
use json::{Value, json};
use serde::Deserialize;

use super::guard;
use crate::{
  notify,
  state::AppState,
  sv::{achievement::Grant, payment::TopUp},
};

fn names(grants: &[Grant]) -> Vec<&str> {
  grants.iter().map(|grant| grant.achievement.name.as_str()).collect()
}

pub async fn health() -> Json<Value> {
  Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ProgressPushReq {
  pub roblox_id: i64,
  pub progress: Value,
}

pub async fn progress_push(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let endpoint = "/game/progress/push";
  guard::signed(&app, endpoint, &headers, &body, |req: ProgressPushReq| {
    let app = app.clone();
    async move {
      let pushed = app.sv().game.sync(req.roblox_id, req.progress).await?;

      if let Some(user) = &pushed.user {
        let notifier = app.notifier.as_ref();
        notify::grants(notifier, user.tg_user_id, &pushed.granted).await;
      }
      Ok(json!({ "success": true, "granted": names(&pushed.granted) }))
    }
  })
  .await
}

#[derive(Debug, Deserialize)]
pub struct ProgressPullReq {
  pub roblox_id: i64,
}

pub async fn progress_pull(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let endpoint = "/game/progress/pull";
  guard::signed(&app, endpoint, &headers, &body, |req: ProgressPullReq| {
    let app = app.clone();
    async move {
      let sv = app.sv();
      let progress =
        sv.game.latest(req.roblox_id).await?.map(|row| row.progress);
      let nuts_balance =
        sv.user.by_roblox(req.roblox_id).await?.map(|user| user.nuts_balance);

      Ok(json!({
        "success": true,
        "roblox_id": req.roblox_id,
        "progress": progress,
        "nuts_balance": nuts_balance,
      }))
    }
  })
  .await
}

#[derive(Debug, Deserialize)]
pub struct GameGrantReq {
  pub roblox_id: i64,
  pub amount: i64,
  #[serde(default)]
  pub reason: Option<String>,
}

pub async fn game_grant(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let endpoint = "/game/grant";
  guard::signed(&app, endpoint, &headers, &body, |req: GameGrantReq| {
    let app = app.clone();
    async move {
      let granted =
        app.sv().game.grant(req.roblox_id, req.amount, req.reason).await?;

      let tg_user_id = granted.user.tg_user_id;
      notify::grants(app.notifier.as_ref(), tg_user_id, &granted.granted).await;
      Ok(json!({
        "success": true,
        "nuts_balance": granted.user.nuts_balance,
        "transaction_id": granted.transaction_id,
        "granted": names(&granted.granted),
      }))
    }
  })
  .await
}

#[derive(Debug, Deserialize)]
pub struct WebhookReq {
  pub external_id: String,
  pub tg_user_id: i64,
  pub amount: i64,
  #[serde(default)]
  pub nuts_amount: Option<i64>,
  #[serde(default)]
  pub invoice_id: Option<i32>,
}

pub async fn payment_webhook(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let endpoint = "/payments/webhook";
  guard::signed(&app, endpoint, &headers, &body, |req: WebhookReq| {
    let app = app.clone();
    async move {
      let top_up = TopUp {
        external_id: req.external_id,
        tg_user_id: req.tg_user_id,
        amount: req.amount,
        nuts_amount: req.nuts_amount,
        invoice_id: req.invoice_id,
      };
      let credited =
        app.sv().payment.top_up(top_up, app.config.nuts_rate).await?;

      notify::top_up(app.notifier.as_ref(), &credited).await;
      Ok(json!({
        "success": true,
        "payment_id": credited.payment.id,
        "duplicate": credited.duplicate,
        "balance": credited.balance,
        "nuts_balance": credited.nuts_balance,
        "granted": names(&credited.granted),
        "referral_bonus": credited.bonus.as_ref().map(|bonus| bonus.amount),
      }))
    }
  })
  .await
}

#[cfg(test)]
mod tests {
  use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
  };
  use tower::ServiceExt;

  use super::*;
  use crate::{
    plugins::server::router,
    security,
    testing::{self, Outbox},
  };

  struct Harness {
    app: Arc<AppState>,
    router: Router,
    outbox: Arc<Outbox>,
  }

  async fn harness() -> Harness {
    let outbox = Outbox::new();
    let app = testing::app(testing::db().await, outbox.clone());
    Harness { router: router(app.clone()), app, outbox }
  }

  fn signed(path: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let body = body.to_string();
    let signature = security::sign(testing::SECRET, body.as_bytes());
    let mut req = Request::post(path)
      .header("content-type", "application/json")
      .header(guard::SIGNATURE_HEADER, signature);
    if let Some(key) = key {
      req = req.header(guard::IDEMPOTENCY_HEADER, key);
    }
    req.body(Body::from(body)).unwrap()
  }

  async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
      Value::Null
    } else {
      json::from_slice(&bytes).unwrap()
    };
    (status, body)
  }

  #[tokio::test]
  async fn test_healthz() {
    let h = harness().await;
    let req = Request::get("/healthz").body(Body::empty()).unwrap();
    let (status, body) = call(&h.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
  }

  #[tokio::test]
  async fn test_tampered_body_is_unauthorized() {
    let h = harness().await;
    let signature = security::sign(testing::SECRET, br#"{"roblox_id":1}"#);
    let req = Request::post("/game/progress/pull")
      .header(guard::SIGNATURE_HEADER, signature)
      .header(guard::IDEMPOTENCY_HEADER, "k1")
      .body(Body::from(r#"{"roblox_id":2}"#))
      .unwrap();

    let (status, body) = call(&h.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let unsigned = Request::post("/game/progress/pull")
      .header(guard::IDEMPOTENCY_HEADER, "k2")
      .body(Body::from(r#"{"roblox_id":2}"#))
      .unwrap();
    assert_eq!(call(&h.router, unsigned).await.0, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn test_missing_idempotency_key() {
    let h = harness().await;
    let req = signed("/game/progress/pull", None, json!({ "roblox_id": 1 }));
    assert_eq!(call(&h.router, req).await.0, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn test_webhook_replay_credits_once() {
    let h = harness().await;
    let payload =
      json!({ "external_id": "pay-1", "tg_user_id": 5, "amount": 100 });

    let webhook = |key| signed("/payments/webhook", Some(key), payload.clone());

    let (status, first) = call(&h.router, webhook("k1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["duplicate"], false);
    assert_eq!(first["nuts_balance"], 100);

    let (status, replay) = call(&h.router, webhook("k1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay, first);

    // another key, same provider id
    let (_, again) = call(&h.router, webhook("k2")).await;
    assert_eq!(again["duplicate"], true);

    let user = h.app.sv().user.by_tg(5).await.unwrap().unwrap();
    assert_eq!(user.nuts_balance, 100);
    assert_eq!(user.balance, 100);
    assert_eq!(h.outbox.sent_to(5).len(), 1);
  }

  #[tokio::test]
  async fn test_failed_request_releases_key() {
    let h = harness().await;
    let payload = json!({ "roblox_id": 77, "amount": 10 });

    let (status, _) =
      call(&h.router, signed("/game/grant", Some("k1"), payload.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    testing::player(&h.app.db, 1, 77).await;
    let (status, body) =
      call(&h.router, signed("/game/grant", Some("k1"), payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nuts_balance"], 10);
    assert!(body["transaction_id"].as_i64().unwrap() > 0);
  }

  #[tokio::test]
  async fn test_progress_push_and_pull() {
    let h = harness().await;
    testing::player(&h.app.db, 1, 9).await;

    let push = json!({ "roblox_id": 9, "progress": { "level": 4 } });
    let (status, body) =
      call(&h.router, signed("/game/progress/push", Some("p1"), push)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted"], json!([]));

    let pull = json!({ "roblox_id": 9 });
    let (_, body) =
      call(&h.router, signed("/game/progress/pull", Some("p2"), pull)).await;
    assert_eq!(body["progress"]["level"], 4);
    assert_eq!(body["nuts_balance"], 0);

    let unknown = json!({ "roblox_id": 404 });
    let (_, body) =
      call(&h.router, signed("/game/progress/pull", Some("p3"), unknown)).await;
    assert_eq!(body["progress"], Value::Null);
    assert_eq!(body["nuts_balance"], Value::Null);
  }

  #[tokio::test]
  async fn test_malformed_body_is_bad_request() {
    let h = harness().await;
    let req = signed("/game/grant", Some("k1"), json!({ "amount": "lots" }));
    assert_eq!(call(&h.router, req).await.0, StatusCode::BAD_REQUEST);
  }
}
