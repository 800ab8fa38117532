use std::sync::Arc;

use axum::{Json, Router, extract, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::state::State;

const MODEL_VERSION: &str = "v0.0.1";

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub dependencies: Dependencies,
}

#[derive(Debug, Serialize)]
pub struct Dependencies {
    pub database: &'static str,
    pub storage: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Version {
    pub api_version: &'static str,
    pub time: DateTime<Utc>,
    pub build_sha: &'static str,
    pub model_version: &'static str,
}

pub fn router() -> Router<Arc<State>> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
}

pub async fn root_handler() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "UrbanHeatmap API" }))
}

/// Always answers 200; a failing dependency only degrades the status.
pub async fn health_handler(extract::State(state): extract::State<Arc<State>>) -> Json<Health> {
    let database = match state.repository.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Health check: database unavailable: {e}");
            "unavailable"
        }
    };

    let storage = if state.storage.is_reachable().await {
        "ok"
    } else {
        warn!("Health check: storage unavailable at {}", state.storage.endpoint().url);
        "unavailable"
    };

    let status = if database == "ok" && storage == "ok" {
        "ok"
    } else {
        "degraded"
    };

    Json(Health {
        status,
        dependencies: Dependencies { database, storage },
    })
}

pub async fn version_handler() -> Json<Version> {
    Json(Version {
        api_version: env!("CARGO_PKG_VERSION"),
        time: Utc::now(),
        build_sha: option_env!("BUILD_SHA").unwrap_or("0000000"),
        model_version: MODEL_VERSION,
    })
}
