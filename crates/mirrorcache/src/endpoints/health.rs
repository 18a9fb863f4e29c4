use axum::response::Json;
use serde_json::{Value, json};

/// A simple endpoint that reports whether the service is healthy.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
