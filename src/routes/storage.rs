use std::sync::Arc;

use axum::{
    Json, Router, extract,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::{
    error::AppError,
    state::State,
    storage::{
        DEFAULT_PRESIGN_EXPIRY, DeleteResponse, ListResponse, PingResponse, PresignedResponse,
        UploadResponse,
    },
    utils::{AppMultipart, AppPath, AppQuery, read_file_field},
};

#[derive(Debug, Deserialize)]
pub struct PresignQuery {
    #[serde(default = "default_expiry")]
    pub expires_seconds: u64,
}

fn default_expiry() -> u64 {
    DEFAULT_PRESIGN_EXPIRY
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: String,
}

pub fn router() -> Router<Arc<State>> {
    Router::new()
        .route("/api/storage/ping", get(ping_handler))
        .route("/api/storage/upload", post(upload_handler))
        .route("/api/storage/presigned/{*object}", get(presigned_handler))
        .route("/api/storage/list", get(list_handler))
        .route("/api/storage/delete/{*object}", delete(delete_handler))
}

pub async fn ping_handler(
    extract::State(state): extract::State<Arc<State>>,
) -> Result<Json<PingResponse>, AppError> {
    Ok(Json(state.storage.ping().await?))
}

pub async fn upload_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppMultipart(mut multipart): AppMultipart,
) -> Result<Json<UploadResponse>, AppError> {
    let file = read_file_field(&mut multipart, "file")
        .await?
        .filter(|file| !file.data.is_empty())
        .ok_or_else(|| AppError::BadRequest("Empty file or no file".into()))?;

    let response = state
        .storage
        .upload(&file.filename, file.content_type.as_deref(), file.data)
        .await?;

    Ok(Json(response))
}

pub async fn presigned_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppPath(object): AppPath<String>,
    AppQuery(query): AppQuery<PresignQuery>,
) -> Result<Json<PresignedResponse>, AppError> {
    Ok(Json(
        state
            .storage
            .presigned_url(&object, query.expires_seconds)
            .await?,
    ))
}

pub async fn list_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    Ok(Json(state.storage.list(&query.prefix).await?))
}

pub async fn delete_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppPath(object): AppPath<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    Ok(Json(state.storage.delete(&object).await?))
}
