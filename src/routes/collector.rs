use std::{path::Path, sync::Arc};

use axum::{Json, Router, extract, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::db_failure;
use crate::{
    error::{AppError, FieldError},
    gpkg::{GpkgConverter, GpkgError},
    ingest::extract_points,
    models::{
        GpkgUploadResponse, HeatmapPointCreate, MAX_DATASET_NAME_LEN, SOURCE_GPKG_UPLOAD,
        SOURCE_MANUAL,
    },
    state::State,
    utils::{AppJson, AppMultipart, AppQuery, dataset_name, is_gpkg_filename, read_file_field},
};

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub layer_name: Option<String>,
}

pub fn router() -> Router<Arc<State>> {
    Router::new()
        .route("/api/collector/upload-gpkg", post(upload_gpkg_handler))
        .route("/api/collector/manual-point", post(manual_point_handler))
}

pub async fn upload_gpkg_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppQuery(query): AppQuery<UploadQuery>,
    AppMultipart(mut multipart): AppMultipart,
) -> Result<Json<GpkgUploadResponse>, AppError> {
    let file = read_file_field(&mut multipart, "file")
        .await?
        .ok_or_else(|| AppError::Validation(vec![FieldError::new("file", "field required")]))?;

    if !is_gpkg_filename(&file.filename) {
        return Err(AppError::BadRequest("File must be a GPKG file".into()));
    }

    // removed when `upload` drops, whichever way this handler returns
    let upload = tempfile::Builder::new().suffix(".gpkg").tempfile()?;
    tokio::fs::write(upload.path(), &file.data).await?;

    let collection = convert(upload.path(), query.layer_name.as_deref())
        .await
        .map_err(|e| {
            error!("Error processing GPKG file: {e}");
            AppError::Internal(format!("Failed to process GPKG file: {e}"))
        })?;

    let extracted = extract_points(&collection);

    let points_created = state
        .repository
        .create_points(&extracted.points, SOURCE_GPKG_UPLOAD)
        .await
        .map_err(|e| {
            error!("Error processing GPKG file: {e}");
            AppError::Internal(format!("Failed to process GPKG file: {e}"))
        })?;

    let name = dataset_name(&file.filename, MAX_DATASET_NAME_LEN);
    let description = format!("Imported from {}", file.filename);

    let dataset_id = match state
        .repository
        .create_dataset(
            &name,
            Some(description.as_str()),
            Some(file.filename.as_str()),
            i32::try_from(points_created).unwrap_or(i32::MAX),
            extracted.extent.as_ref(),
        )
        .await
    {
        Ok(dataset) => Some(dataset.id),
        Err(e) => {
            warn!("Points imported but dataset could not be recorded: {e}");
            None
        }
    };

    info!(
        "Successfully processed GPKG file: {points_created} points created, {} features skipped",
        extracted.skipped
    );

    Ok(Json(GpkgUploadResponse {
        message: "Successfully processed GPKG file".into(),
        points_created,
        skipped_features: extracted.skipped,
        dataset_id,
    }))
}

async fn convert(
    path: &Path,
    layer: Option<&str>,
) -> Result<geojson::FeatureCollection, GpkgError> {
    let mut converter = GpkgConverter::open(path).await?;
    converter.convert(layer).await
}

pub async fn manual_point_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppJson(point): AppJson<HeatmapPointCreate>,
) -> Result<Json<Value>, AppError> {
    point.validate()?;

    let created = state
        .repository
        .create_point(&point, Some(SOURCE_MANUAL))
        .await
        .map_err(db_failure("Failed to add point"))?;

    info!("Added manual heat point {}", created.id);

    Ok(Json(json!({
        "message": "Point added successfully",
        "point_id": created.id.to_string(),
    })))
}
