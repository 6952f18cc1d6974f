//! Liveness and readiness endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::time::Duration;

use crate::AppState;

const DATABASE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness response. `database` is `"ok"` or `"unavailable"`.
#[derive(Serialize)]
pub struct ReadyResponse {
    pub database: &'static str,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready))
        .route("/", get(root))
}

/// The process is up. Never touches the database.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The database answers within [`DATABASE_PROBE_TIMEOUT`].
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let probe = sqlx::query("SELECT 1").execute(&state.pool);
    match tokio::time::timeout(DATABASE_PROBE_TIMEOUT, probe).await {
        Ok(Ok(_)) => (StatusCode::OK, Json(ReadyResponse { database: "ok" })),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "readiness probe failed");
            unavailable()
        }
        Err(_) => {
            tracing::warn!("readiness probe timed out");
            unavailable()
        }
    }
}

fn unavailable() -> (StatusCode, Json<ReadyResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadyResponse {
            database: "unavailable",
        }),
    )
}

async fn root() -> &'static str {
    "Eddy Favorites Server"
}
