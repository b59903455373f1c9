//! Router-level integration tests: real router, in-memory SQLite store,
//! stubbed upstream bound on an ephemeral local port.

use std::{sync::Arc, time::Duration};

use axum::{
  Json, Router,
  body::Body,
  http::{Request, StatusCode, header},
  routing::post,
};
use palaver_store_sqlite::SqliteStore;
use palaver_upstream::UpstreamClient;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::AppState;

// ─── Harness ─────────────────────────────────────────────────────────────────

/// Bind a stub generate endpoint and return its URL.
async fn stub_upstream(router: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, router).await.unwrap();
  });
  format!("http://{addr}/generate")
}

/// A stub upstream that always answers with one fixed candidate text.
async fn hello_upstream() -> String {
  stub_upstream(Router::new().route(
    "/generate",
    post(|| async {
      Json(json!({
        "candidates": [
          {"content": {"parts": [{"text": "Hello!"}], "role": "model"}}
        ]
      }))
    }),
  ))
  .await
}

async fn make_state(upstream_url: &str, timeout: Duration) -> AppState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let upstream =
    UpstreamClient::with_endpoint(upstream_url, "test-key", timeout).unwrap();
  AppState { store: Arc::new(store), upstream: Arc::new(upstream) }
}

/// State for tests that never reach the upstream call.
async fn make_state_no_upstream() -> AppState<SqliteStore> {
  // Port 9 (discard) is never listened on; a request there would fail fast.
  make_state("http://127.0.0.1:9/generate", Duration::from_secs(1)).await
}

async fn send(
  state: AppState<SqliteStore>,
  method: &str,
  uri: &str,
  cookie: Option<&str>,
  body: Option<Value>,
) -> axum::response::Response {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(c) = cookie {
    builder = builder.header(header::COOKIE, c);
  }
  let req = match body {
    Some(v) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(v.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  crate::router(state).oneshot(req).await.unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

/// Extract the `name=value` cookie pair from a response's Set-Cookie.
fn cookie_of(resp: &axum::response::Response) -> String {
  resp
    .headers()
    .get(header::SET_COOKIE)
    .expect("Set-Cookie header")
    .to_str()
    .unwrap()
    .split(';')
    .next()
    .unwrap()
    .to_string()
}

/// Register a user and return their session cookie.
async fn register(
  state: AppState<SqliteStore>,
  name: &str,
  email: &str,
  password: &str,
) -> String {
  let resp = send(
    state,
    "POST",
    "/api/register",
    None,
    Some(json!({ "displayName": name, "username": email, "password": password })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  cookie_of(&resp)
}

fn chat_body(session_id: &str, text: &str) -> Value {
  json!({
    "session_id": session_id,
    "contents": [{ "role": "user", "parts": [{ "text": text }] }],
    "language_name": "English",
  })
}

/// Create a chat session and return its id.
async fn new_session(state: AppState<SqliteStore>, cookie: &str) -> String {
  let resp =
    send(state, "POST", "/api/new_chat_session", Some(cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  body_json(resp).await["session_id"].as_str().unwrap().to_string()
}

// ─── Registration & login ────────────────────────────────────────────────────

#[tokio::test]
async fn register_creates_user_and_sets_cookie() {
  let state = make_state_no_upstream().await;
  let resp = send(
    state,
    "POST",
    "/api/register",
    None,
    Some(json!({ "displayName": "Alice", "username": "a@x.com", "password": "pw" })),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::CREATED);
  assert!(cookie_of(&resp).starts_with("palaver-session="));
  let body = body_json(resp).await;
  assert!(body["user_id"].as_str().unwrap().starts_with("local:"));
}

#[tokio::test]
async fn register_missing_field_is_400() {
  let state = make_state_no_upstream().await;
  let resp = send(
    state,
    "POST",
    "/api/register",
    None,
    Some(json!({ "displayName": "Alice", "username": "a@x.com" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_registration_is_409() {
  let state = make_state_no_upstream().await;
  register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp = send(
    state,
    "POST",
    "/api/register",
    None,
    Some(json!({ "displayName": "Imp", "username": "a@x.com", "password": "x" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_with_correct_credentials_sets_cookie() {
  let state = make_state_no_upstream().await;
  register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp = send(
    state,
    "POST",
    "/api/login",
    None,
    Some(json!({ "username": "a@x.com", "password": "pw" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert!(cookie_of(&resp).starts_with("palaver-session="));
}

#[tokio::test]
async fn bad_password_and_unknown_email_are_indistinguishable() {
  let state = make_state_no_upstream().await;
  register(state.clone(), "Alice", "a@x.com", "pw").await;

  let wrong_pw = send(
    state.clone(),
    "POST",
    "/api/login",
    None,
    Some(json!({ "username": "a@x.com", "password": "nope" })),
  )
  .await;
  let no_user = send(
    state,
    "POST",
    "/api/login",
    None,
    Some(json!({ "username": "ghost@x.com", "password": "pw" })),
  )
  .await;

  assert_eq!(wrong_pw.status(), StatusCode::UNAUTHORIZED);
  assert_eq!(no_user.status(), StatusCode::UNAUTHORIZED);
  assert_eq!(body_json(wrong_pw).await, body_json(no_user).await);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp =
    send(state.clone(), "POST", "/api/logout", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let after =
    send(state, "GET", "/api/all_sessions", Some(&cookie), None).await;
  assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

// ─── Session binding ─────────────────────────────────────────────────────────

#[tokio::test]
async fn protected_endpoints_reject_missing_session() {
  let state = make_state_no_upstream().await;
  for (method, uri) in [
    ("GET", "/api/all_sessions"),
    ("POST", "/api/new_chat_session"),
  ] {
    let resp = send(state.clone(), method, uri, None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
  }
}

#[tokio::test]
async fn garbage_cookie_is_unauthenticated() {
  let state = make_state_no_upstream().await;
  let resp = send(
    state,
    "GET",
    "/api/all_sessions",
    Some("palaver-session=forged-token"),
    None,
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ─── Profile ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_profile_applies_fields() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp = send(
    state,
    "PUT",
    "/api/update_profile",
    Some(&cookie),
    Some(json!({ "theme": "light", "voice": "nova" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["user"]["theme"], "light");
  assert_eq!(body["user"]["voice"], "nova");
  assert_eq!(body["user"]["displayName"], "Alice");
}

#[tokio::test]
async fn empty_profile_update_is_400() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp = send(
    state,
    "PUT",
    "/api/update_profile",
    Some(&cookie),
    Some(json!({})),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── Sessions & history ──────────────────────────────────────────────────────

#[tokio::test]
async fn new_session_appears_in_listing() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  let resp =
    send(state, "GET", "/api/all_sessions", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  let sessions = body["sessions"].as_array().unwrap();
  assert_eq!(sessions.len(), 1);
  assert_eq!(sessions[0]["session_id"], session_id.as_str());
  assert_eq!(sessions[0]["title"], "New Chat Session");
}

#[tokio::test]
async fn history_with_malformed_id_is_a_json_404() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp = send(
    state,
    "GET",
    "/api/history/not-a-uuid",
    Some(&cookie),
    None,
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  // Same JSON error shape as every other failure.
  let body = body_json(resp).await;
  assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn history_of_another_users_session_is_404() {
  let state = make_state_no_upstream().await;
  let alice = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let bob = register(state.clone(), "Bob", "b@x.com", "pw").await;
  let session_id = new_session(state.clone(), &alice).await;

  let resp = send(
    state,
    "GET",
    &format!("/api/history/{session_id}"),
    Some(&bob),
    None,
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ─── Chat pipeline ───────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_round_trip_persists_both_turns() {
  let url = hello_upstream().await;
  let state = make_state(&url, Duration::from_secs(5)).await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  let resp = send(
    state.clone(),
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(chat_body(&session_id, "hi")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  // The upstream body comes back verbatim.
  let body = body_json(resp).await;
  assert_eq!(
    body["candidates"][0]["content"]["parts"][0]["text"],
    "Hello!"
  );

  let history = body_json(
    send(
      state,
      "GET",
      &format!("/api/history/{session_id}"),
      Some(&cookie),
      None,
    )
    .await,
  )
  .await;
  let turns = history["history"].as_array().unwrap();
  assert_eq!(turns.len(), 2);
  assert_eq!(turns[0]["role"], "user");
  assert_eq!(turns[0]["parts"][0]["text"], "hi");
  assert_eq!(turns[1]["role"], "model");
  assert_eq!(turns[1]["parts"][0]["text"], "Hello!");
}

#[tokio::test]
async fn chat_derives_the_session_title() {
  let url = hello_upstream().await;
  let state = make_state(&url, Duration::from_secs(5)).await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  send(
    state.clone(),
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(chat_body(&session_id, "hi")),
  )
  .await;

  let body = body_json(
    send(state, "GET", "/api/all_sessions", Some(&cookie), None).await,
  )
  .await;
  assert_eq!(body["sessions"][0]["title"], "hi");
}

#[tokio::test]
async fn chat_without_session_id_is_400() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;

  let resp = send(
    state,
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(json!({
      "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }]
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_against_unowned_session_is_404() {
  let state = make_state_no_upstream().await;
  let alice = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let bob = register(state.clone(), "Bob", "b@x.com", "pw").await;
  let session_id = new_session(state.clone(), &alice).await;

  // Bob holds Alice's session id; the ownership check runs before any
  // write, so nothing is touched or persisted.
  let resp = send(
    state.clone(),
    "POST",
    "/api/chat",
    Some(&bob),
    Some(chat_body(&session_id, "hijack")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let history = body_json(
    send(
      state,
      "GET",
      &format!("/api/history/{session_id}"),
      Some(&alice),
      None,
    )
    .await,
  )
  .await;
  assert_eq!(history["history"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn oversized_image_is_413_and_nothing_is_persisted() {
  let state = make_state_no_upstream().await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  // ~6 MB decoded, over the 5 MB budget.
  let resp = send(
    state.clone(),
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(json!({
      "session_id": session_id,
      "contents": [{
        "role": "user",
        "parts": [{
          "inlineData": { "mimeType": "image/png", "data": "A".repeat(8 * 1024 * 1024) }
        }]
      }]
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

  let history = body_json(
    send(
      state,
      "GET",
      &format!("/api/history/{session_id}"),
      Some(&cookie),
      None,
    )
    .await,
  )
  .await;
  assert_eq!(history["history"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn upstream_timeout_is_504_with_user_turn_persisted() {
  let url = stub_upstream(Router::new().route(
    "/generate",
    post(|| async {
      tokio::time::sleep(Duration::from_secs(2)).await;
      Json(Value::Null)
    }),
  ))
  .await;
  let state = make_state(&url, Duration::from_millis(100)).await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  let resp = send(
    state.clone(),
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(chat_body(&session_id, "hi")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

  // The user turn was written before the upstream call; no model turn.
  let history = body_json(
    send(
      state,
      "GET",
      &format!("/api/history/{session_id}"),
      Some(&cookie),
      None,
    )
    .await,
  )
  .await;
  let turns = history["history"].as_array().unwrap();
  assert_eq!(turns.len(), 1);
  assert_eq!(turns[0]["role"], "user");
}

#[tokio::test]
async fn upstream_error_status_is_passed_through() {
  let url = stub_upstream(Router::new().route(
    "/generate",
    post(|| async {
      (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"error": {"message": "quota exceeded"}})),
      )
    }),
  ))
  .await;
  let state = make_state(&url, Duration::from_secs(5)).await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  let resp = send(
    state,
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(chat_body(&session_id, "hi")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
  let body = body_json(resp).await;
  assert!(
    body["error"].as_str().unwrap().contains("quota exceeded"),
    "body: {body}"
  );
}

#[tokio::test]
async fn blocked_prompt_reply_is_persisted_as_model_turn() {
  let url = stub_upstream(Router::new().route(
    "/generate",
    post(|| async {
      Json(json!({"promptFeedback": {"blockReason": "SAFETY"}}))
    }),
  ))
  .await;
  let state = make_state(&url, Duration::from_secs(5)).await;
  let cookie = register(state.clone(), "Alice", "a@x.com", "pw").await;
  let session_id = new_session(state.clone(), &cookie).await;

  let resp = send(
    state.clone(),
    "POST",
    "/api/chat",
    Some(&cookie),
    Some(chat_body(&session_id, "hi")),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let history = body_json(
    send(
      state,
      "GET",
      &format!("/api/history/{session_id}"),
      Some(&cookie),
      None,
    )
    .await,
  )
  .await;
  let turns = history["history"].as_array().unwrap();
  assert_eq!(turns.len(), 2);
  assert_eq!(turns[1]["role"], "model");
  assert!(
    turns[1]["parts"][0]["text"]
      .as_str()
      .unwrap()
      .contains("SAFETY")
  );
}

// ─── Federated login ─────────────────────────────────────────────────────────

#[tokio::test]
async fn federated_login_binds_a_session_like_a_local_one() {
  use palaver_core::user::FederatedProfile;

  let state = make_state_no_upstream().await;
  let (ctx, token) = crate::auth::login_federated(
    state.store.as_ref(),
    FederatedProfile {
      email:        "fed@x.com".into(),
      display_name: "Fed".into(),
      subject_id:   "sub-42".into(),
      picture_url:  None,
    },
  )
  .await
  .unwrap();
  assert_eq!(ctx.email, "fed@x.com");

  let cookie = format!("palaver-session={token}");
  let resp =
    send(state, "GET", "/api/all_sessions", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
}
