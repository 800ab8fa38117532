use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use crate::gpkg::GpkgError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    NotFound { message: String, details: Value },

    #[error("{message}")]
    BadGateway { message: String, details: Value },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("GeoPackage error: {0}")]
    Gpkg(#[from] GpkgError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        AppError::BadGateway {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MalformedRequest(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn envelope(&self) -> Value {
        let (kind, message, details) = match self {
            AppError::Validation(fields) => {
                ("validation_error", self.to_string(), json!(fields))
            }
            AppError::MalformedRequest(reason) => (
                "validation_error",
                "Validation failed".to_string(),
                json!(reason),
            ),
            AppError::NotFound { message, details } => {
                ("not_found", message.clone(), details.clone())
            }
            AppError::BadRequest(message) => ("http_error", message.clone(), Value::Null),
            AppError::BadGateway { message, details } => {
                ("http_error", message.clone(), details.clone())
            }
            AppError::Internal(message) => {
                ("internal_server_error", message.clone(), Value::Null)
            }
            _ => (
                "internal_server_error",
                "An unexpected error occurred.".to_string(),
                Value::Null,
            ),
        };

        json!({
            "error": {
                "type": kind,
                "message": message,
                "details": details,
            }
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Unhandled error: {self}");
        }

        (status, Json(self.envelope())).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::MalformedRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::MalformedRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::MalformedRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::BadRequest(format!("Malformed multipart body: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_of(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let (status, body) = body_of(AppError::Validation(vec![FieldError::new(
            "latitude",
            "must be between -90 and 90",
        )]))
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["type"], "validation_error");
        assert_eq!(body["error"]["message"], "Validation failed");
        assert_eq!(body["error"]["details"][0]["field"], "latitude");
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let (status, body) = body_of(AppError::NotFound {
            message: "Resource not found".into(),
            details: json!({ "path": "/nope" }),
        })
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found");
        assert_eq!(body["error"]["details"]["path"], "/nope");
    }

    #[tokio::test]
    async fn test_http_errors() {
        let (status, body) = body_of(AppError::BadRequest("Invalid bounds".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "http_error");
        assert_eq!(body["error"]["message"], "Invalid bounds");

        let (status, _) = body_of(AppError::bad_gateway("Minio error: NoSuchBucket")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_internal_errors_hide_sources() {
        let (status, body) = body_of(AppError::Database(sqlx::Error::PoolTimedOut)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "internal_server_error");
        assert_eq!(body["error"]["message"], "An unexpected error occurred.");
        assert_eq!(body["error"]["details"], Value::Null);
    }
}
