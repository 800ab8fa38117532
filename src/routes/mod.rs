//! HTTP surface.
//!
//! | Prefix | Module |
//! |---|---|
//! | `/`, `/health`, `/version` | [`system`] |
//! | `/api/heatmap` | [`heatmap`] |
//! | `/api/collector` | [`collector`] |
//! | `/api/storage` | [`storage`] |
//!
//! Every request goes through the trace layer, which logs method, URI,
//! status code and processing time once the response is ready.
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, Uri},
    response::Response,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, info_span};

use crate::{cors::build_cors_layer, error::AppError, state::State};

pub mod collector;
pub mod heatmap;
pub mod storage;
pub mod system;

pub const MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

pub fn router(state: Arc<State>) -> Result<Router, AppError> {
    let cors = build_cors_layer(&state.config.cors_allowed_origins)?;

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            info_span!("request", method = %request.method(), uri = %request.uri())
        })
        .on_request(())
        .on_response(|response: &Response, latency: Duration, _: &Span| {
            info!(
                status_code = response.status().as_u16(),
                process_time_ms = latency.as_secs_f64() * 1000.0,
                "request completed"
            );
        });

    Ok(Router::new()
        .merge(system::router())
        .merge(heatmap::router())
        .merge(collector::router())
        .merge(storage::router())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(trace)
        .layer(cors)
        .with_state(state))
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound {
        message: "Resource not found".into(),
        details: json!({ "path": uri.path() }),
    }
}

/// Logs a database failure and answers 500 with `message`.
pub(crate) fn db_failure(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        error!("{message}: {e}");
        AppError::Internal(message.to_string())
    }
}
