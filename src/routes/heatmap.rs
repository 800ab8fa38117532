use std::sync::Arc;

use axum::{
    Json, Router, extract,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::info;

use super::db_failure;
use crate::{
    error::AppError,
    models::{HeatmapData, HeatmapPoint, HeatmapPointCreate, HeatmapQuery, Statistics},
    state::State,
    utils::{AppJson, AppPath, AppQuery},
};

pub fn router() -> Router<Arc<State>> {
    Router::new()
        .route("/api/heatmap", get(heatmap_handler))
        .route("/api/heatmap/point", post(create_point_handler))
        .route(
            "/api/heatmap/point/{id}",
            get(get_point_handler).delete(delete_point_handler),
        )
        .route("/api/heatmap/statistics", get(statistics_handler))
}

pub async fn heatmap_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppQuery(query): AppQuery<HeatmapQuery>,
) -> Result<Json<HeatmapData>, AppError> {
    let (bounds, page) = query.validate()?;

    let points = match &bounds {
        Some(bounds) => state.repository.get_points_in_bounds(bounds, page).await,
        None => state.repository.get_all_points(page).await,
    }
    .map_err(db_failure("Error fetching heatmap data"))?;

    Ok(Json(HeatmapData {
        total_count: points.len(),
        points,
        bounds,
    }))
}

pub async fn create_point_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppJson(point): AppJson<HeatmapPointCreate>,
) -> Result<Json<HeatmapPoint>, AppError> {
    point.validate()?;

    let created = state
        .repository
        .create_point(&point, None)
        .await
        .map_err(db_failure("Failed to create point"))?;

    info!("Created heat point {}", created.id);

    Ok(Json(created))
}

pub async fn get_point_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<HeatmapPoint>, AppError> {
    state
        .repository
        .get_point_by_id(id)
        .await
        .map_err(db_failure("Failed to fetch point"))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Point not found"))
}

pub async fn delete_point_handler(
    extract::State(state): extract::State<Arc<State>>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .repository
        .delete_point(id)
        .await
        .map_err(db_failure("Failed to delete point"))?;

    if !deleted {
        return Err(AppError::not_found("Point not found"));
    }

    info!("Deleted heat point {id}");

    Ok(Json(json!({ "message": "Point deleted successfully" })))
}

pub async fn statistics_handler(
    extract::State(state): extract::State<Arc<State>>,
) -> Result<Json<Statistics>, AppError> {
    let statistics = state
        .repository
        .get_statistics()
        .await
        .map_err(db_failure("Failed to fetch statistics"))?;

    Ok(Json(statistics))
}
