//! `/system/ping` (unauthenticated liveness check) and `/system/health`.

use axum::Json;
use chrono::Utc;
use serde_json::json;

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}
