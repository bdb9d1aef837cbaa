//! HTTP surface for Ident.
//!
//! Exposes an axum [`Router`] serving `POST /identify` and `GET /health`,
//! backed by any [`ContactStore`]. TLS and authentication are the caller's
//! responsibility.

pub mod error;
pub mod health;
pub mod identify;
pub mod validate;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc, time::Instant};

use axum::{
  Router,
  routing::{get, post},
};
use ident_core::{
  resolver::{Resolver, ResolverConfig},
  store::ContactStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `IDENT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:        String,
  #[serde(default = "default_port")]
  pub port:        u16,
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
  #[serde(default = "default_log_level")]
  pub log_level:   String,
}

fn default_host() -> String { "0.0.0.0".to_owned() }
fn default_port() -> u16 { 3000 }
fn default_store_path() -> PathBuf { PathBuf::from("ident.db") }
fn default_max_retries() -> u32 { ResolverConfig::default().max_retries }
fn default_log_level() -> String { "info".to_owned() }

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:        default_host(),
      port:        default_port(),
      store_path:  default_store_path(),
      max_retries: default_max_retries(),
      log_level:   default_log_level(),
    }
  }
}

impl ServerConfig {
  pub fn resolver_config(&self) -> ResolverConfig {
    ResolverConfig {
      max_retries: self.max_retries,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub resolver:   Arc<Resolver<S>>,
  pub started_at: Instant,
}

impl<S> AppState<S> {
  pub fn new(resolver: Resolver<S>) -> Self {
    Self {
      resolver:   Arc::new(resolver),
      started_at: Instant::now(),
    }
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      resolver:   self.resolver.clone(),
      started_at: self.started_at,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the identity service.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ContactStore + 'static,
{
  Router::new()
    .route("/identify", post(identify::handler::<S>))
    .route("/health", get(health::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::Utc;
  use ident_core::{
    Error,
    audit::verify_graph,
    contact::{Contact, LinkPrecedence},
    memory::MemoryStore,
    store::ContactTx,
  };
  use ident_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(Resolver::new(Arc::new(store), ResolverConfig::default()))
  }

  async fn send<S: ContactStore + 'static>(
    state: &AppState<S>,
    req: Request<Body>,
  ) -> (StatusCode, Value) {
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
  }

  async fn identify<S: ContactStore + 'static>(
    state: &AppState<S>,
    body: Value,
  ) -> (StatusCode, Value) {
    let req = Request::builder()
      .method("POST")
      .uri("/identify")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap();
    send(state, req).await
  }

  // ── Identify ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn first_request_creates_primary() {
    let state = make_state().await;
    let (status, body) = identify(
      &state,
      json!({ "email": "lorraine@hillvalley.edu", "phoneNumber": "+1 555 0100" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
      body,
      json!({ "contact": {
        "primaryContactId": 1,
        "emails": ["lorraine@hillvalley.edu"],
        "phoneNumbers": ["+1 555 0100"],
        "secondaryContactIds": [],
      }})
    );
  }

  #[tokio::test]
  async fn new_email_on_known_phone_links_as_secondary() {
    let state = make_state().await;
    identify(&state, json!({ "email": "lorraine@hillvalley.edu", "phoneNumber": "5550100123" })).await;
    let (status, body) = identify(
      &state,
      json!({ "email": "mcfly@hillvalley.edu", "phoneNumber": "5550100123" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let contact = &body["contact"];
    assert_eq!(contact["primaryContactId"], 1);
    assert_eq!(
      contact["emails"],
      json!(["lorraine@hillvalley.edu", "mcfly@hillvalley.edu"])
    );
    assert_eq!(contact["secondaryContactIds"], json!([2]));
  }

  #[tokio::test]
  async fn numeric_phone_is_accepted() {
    let state = make_state().await;
    let (status, body) = identify(&state, json!({ "phoneNumber": 5550100123u64 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["phoneNumbers"], json!(["5550100123"]));
  }

  #[tokio::test]
  async fn bridging_request_merges_groups() {
    let state = make_state().await;
    identify(&state, json!({ "email": "george@hillvalley.edu", "phoneNumber": "9190000001" })).await;
    identify(&state, json!({ "email": "biff@hillvalley.edu", "phoneNumber": "7170000002" })).await;

    let (status, body) = identify(
      &state,
      json!({ "email": "george@hillvalley.edu", "phoneNumber": "7170000002" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let contact = &body["contact"];
    assert_eq!(contact["primaryContactId"], 1);
    assert_eq!(
      contact["emails"],
      json!(["george@hillvalley.edu", "biff@hillvalley.edu"])
    );
    assert_eq!(contact["phoneNumbers"], json!(["9190000001", "7170000002"]));
    // The bridging pair itself is recorded under the surviving primary.
    assert_eq!(contact["secondaryContactIds"], json!([2, 3]));

    let rows = state.resolver.store().list_contacts().await.unwrap();
    assert_eq!(rows.len(), 3);
    verify_graph(&rows).unwrap();
  }

  #[tokio::test]
  async fn invalid_fields_fail_validation() {
    let state = make_state().await;
    let (status, body) = identify(&state, json!({ "email": "nope", "phoneNumber": "12" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["status"], 400);
    let fields: Vec<_> = body["error"]["details"]
      .as_array()
      .unwrap()
      .iter()
      .map(|d| d["field"].as_str().unwrap().to_owned())
      .collect();
    assert_eq!(fields, ["email", "phoneNumber"]);

    assert!(state.resolver.store().list_contacts().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn empty_body_fails_validation() {
    let state = make_state().await;
    let (status, body) = identify(&state, json!({ "email": null, "phoneNumber": null })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
  }

  #[tokio::test]
  async fn malformed_json_is_rejected() {
    let state = make_state().await;
    let req = Request::builder()
      .method("POST")
      .uri("/identify")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from("{\"email\":"))
      .unwrap();
    let (status, body) = send(&state, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_JSON");
  }

  #[tokio::test]
  async fn wrong_field_types_fail_validation() {
    let state = make_state().await;

    let (status, body) = identify(&state, json!({ "email": 123 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["details"][0]["field"], "email");

    let (status, body) = identify(&state, json!({ "phoneNumber": true })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["details"][0]["field"], "phoneNumber");
  }

  // ── Server errors ───────────────────────────────────────────────────────────

  /// A store whose transactions always conflict and whose ping fails.
  struct Unavailable;

  impl ContactStore for Unavailable {
    async fn run_in_transaction<F, T>(&self, _f: F) -> ident_core::Result<T>
    where
      F: FnOnce(&mut dyn ContactTx) -> ident_core::Result<T> + Send + 'static,
      T: Send + 'static,
    {
      Err(Error::ConcurrencyConflict("database is locked".into()))
    }

    async fn ping(&self) -> ident_core::Result<()> {
      Err(Error::Store("connection refused".into()))
    }
  }

  fn unavailable() -> AppState<Unavailable> {
    AppState::new(Resolver::new(Arc::new(Unavailable), ResolverConfig::default()))
  }

  fn assert_internal_error(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
      body,
      &json!({ "error": {
        "status": 500,
        "message": "Internal server error",
        "code": "INTERNAL_ERROR",
      }})
    );
  }

  #[tokio::test]
  async fn corrupt_graph_is_an_opaque_server_error() {
    let now = Utc::now();
    let orphan = Contact {
      id:              2,
      email:           Some("lost@hillvalley.edu".into()),
      phone_number:    None,
      linked_id:       Some(9),
      link_precedence: LinkPrecedence::Secondary,
      created_at:      now,
      updated_at:      now,
      deleted_at:      None,
    };
    let store = MemoryStore::from_contacts([orphan]);
    let state = AppState::new(Resolver::new(Arc::new(store), ResolverConfig::default()));

    let (status, body) = identify(&state, json!({ "email": "lost@hillvalley.edu" })).await;
    assert_internal_error(status, &body);
  }

  #[tokio::test]
  async fn persistent_conflict_is_an_opaque_server_error() {
    let state = unavailable();
    let (status, body) = identify(&state, json!({ "email": "doc@hillvalley.edu" })).await;
    assert_internal_error(status, &body);
  }

  // ── Health ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_reports_database() {
    let state = make_state().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&state, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "connected");
    assert!(body["database"]["latency"].is_u64());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
  }

  #[tokio::test]
  async fn failed_ping_is_503() {
    let state = unavailable();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&state, req).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"]["status"], "disconnected");
    assert!(body["database"].get("latency").is_none());
  }

  #[tokio::test]
  async fn unknown_route_is_404() {
    let state = make_state().await;
    let req = Request::builder().uri("/contacts").body(Body::empty()).unwrap();
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  // ── Configuration ───────────────────────────────────────────────────────────

  #[test]
  fn config_defaults_fill_missing_keys() {
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str("port = 8080", config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.host, "0.0.0.0");
    assert_eq!(cfg.store_path, PathBuf::from("ident.db"));
    assert_eq!(cfg.resolver_config().max_retries, 2);
    assert_eq!(cfg.log_level, "info");
  }
}
