pub mod oauth;
pub mod tasks;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::Config;
use crate::AppState;

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(oauth::routes())
        .merge(tasks::routes(config))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": true }))
}
