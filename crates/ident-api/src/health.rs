//! `GET /health`.

use std::time::Instant;

use axum::{Json, extract::State, http::StatusCode};
use chrono::{SecondsFormat, Utc};
use ident_core::store::ContactStore;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
  pub status:    &'static str,
  pub timestamp: String,
  pub version:   &'static str,
  /// Seconds since the server started.
  pub uptime:    u64,
  pub database:  DatabaseHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
  /// `"connected"` or `"disconnected"`.
  pub status:  &'static str,
  /// Round-trip time of the store ping, in milliseconds. Absent when the
  /// ping failed.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub latency: Option<u64>,
}

pub async fn handler<S>(State(state): State<AppState<S>>) -> (StatusCode, Json<Health>)
where
  S: ContactStore + 'static,
{
  let started = Instant::now();
  let ping = state.resolver.store().ping().await;
  let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

  let (status, code, database) = match &ping {
    Ok(()) => ("healthy", StatusCode::OK, DatabaseHealth {
      status:  "connected",
      latency: Some(latency),
    }),
    Err(e) => {
      tracing::error!(error = %e, "store ping failed");
      ("unhealthy", StatusCode::SERVICE_UNAVAILABLE, DatabaseHealth {
        status:  "disconnected",
        latency: None,
      })
    }
  };

  (code, Json(Health {
    status,
    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    version: env!("CARGO_PKG_VERSION"),
    uptime: state.started_at.elapsed().as_secs(),
    database,
  }))
}
