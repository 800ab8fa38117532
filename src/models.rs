//! Request, response and row types for heat points and datasets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, FieldError};

pub const DEFAULT_LIMIT: u32 = 1000;
pub const MAX_LIMIT: u32 = 10_000;
pub const MAX_SOURCE_LEN: usize = 100;
pub const MAX_DATASET_NAME_LEN: usize = 200;

pub const SOURCE_MANUAL: &str = "manual";
pub const SOURCE_GPKG_UPLOAD: &str = "gpkg_upload";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct HeatmapPoint {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub intensity: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeatmapPointCreate {
    pub latitude: f64,
    pub longitude: f64,
    pub intensity: f64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    /// Extra feature properties kept as a JSON string; never read from clients.
    #[serde(skip)]
    pub meta_data: Option<String>,
}

impl HeatmapPointCreate {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        check_range(&mut errors, "latitude", self.latitude, -90.0, 90.0);
        check_range(&mut errors, "longitude", self.longitude, -180.0, 180.0);
        check_range(&mut errors, "intensity", self.intensity, 0.0, 1.0);

        if let Some(humidity) = self.humidity {
            check_range(&mut errors, "humidity", humidity, 0.0, 100.0);
        }

        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() {
                errors.push(FieldError::new("temperature", "must be a finite number"));
            }
        }

        if let Some(source) = &self.source {
            if source.chars().count() > MAX_SOURCE_LEN {
                errors.push(FieldError::new(
                    "source",
                    format!("must be at most {MAX_SOURCE_LEN} characters"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

fn check_range(errors: &mut Vec<FieldError>, field: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() || value < min || value > max {
        errors.push(FieldError::new(
            field,
            format!("must be between {min} and {max}"),
        ));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

/// Query string of `GET /api/heatmap`.
#[derive(Debug, Default, Deserialize)]
pub struct HeatmapQuery {
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lon: Option<f64>,
    pub max_lon: Option<f64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HeatmapQuery {
    /// Bounds are only applied when all four coordinates are given.
    pub fn validate(&self) -> Result<(Option<Bounds>, Pagination), AppError> {
        let mut errors = Vec::new();

        for (field, value, limit) in [
            ("min_lat", self.min_lat, 90.0),
            ("max_lat", self.max_lat, 90.0),
            ("min_lon", self.min_lon, 180.0),
            ("max_lon", self.max_lon, 180.0),
        ] {
            if let Some(value) = value {
                check_range(&mut errors, field, value, -limit, limit);
            }
        }

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit > MAX_LIMIT {
            errors.push(FieldError::new(
                "limit",
                format!("must be at most {MAX_LIMIT}"),
            ));
        }

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let bounds = match (self.min_lat, self.max_lat, self.min_lon, self.max_lon) {
            (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => {
                if max_lat <= min_lat || max_lon <= min_lon {
                    return Err(AppError::BadRequest("Invalid bounds".into()));
                }

                Some(Bounds {
                    min_lat,
                    max_lat,
                    min_lon,
                    max_lon,
                })
            }
            _ => None,
        };

        Ok((
            bounds,
            Pagination {
                limit: limit.into(),
                offset: self.offset.unwrap_or(0).into(),
            },
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct HeatmapData {
    pub points: Vec<HeatmapPoint>,
    pub total_count: usize,
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct HeatmapDataset {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub file_path: Option<String>,
    pub point_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Statistics {
    pub total_points: i64,
    pub average_intensity: f64,
    pub max_intensity: f64,
    pub min_intensity: f64,
}

#[derive(Debug, Serialize)]
pub struct GpkgUploadResponse {
    pub message: String,
    pub points_created: u64,
    pub skipped_features: usize,
    pub dataset_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> HeatmapPointCreate {
        HeatmapPointCreate {
            latitude: 48.2,
            longitude: 16.37,
            intensity: 0.7,
            temperature: Some(31.5),
            humidity: Some(40.0),
            source: Some("sensor".into()),
            meta_data: None,
        }
    }

    fn fields(error: AppError) -> Vec<String> {
        match error {
            AppError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_point() {
        assert!(point().validate().is_ok());
    }

    #[test]
    fn test_point_range_errors_are_collected() {
        let invalid = HeatmapPointCreate {
            latitude: 91.0,
            longitude: -181.0,
            intensity: 1.5,
            humidity: Some(101.0),
            ..point()
        };

        assert_eq!(
            fields(invalid.validate().unwrap_err()),
            vec!["latitude", "longitude", "intensity", "humidity"]
        );
    }

    #[test]
    fn test_point_source_too_long() {
        let invalid = HeatmapPointCreate {
            source: Some("x".repeat(MAX_SOURCE_LEN + 1)),
            ..point()
        };

        assert_eq!(fields(invalid.validate().unwrap_err()), vec!["source"]);
    }

    #[test]
    fn test_point_ignores_client_meta_data() {
        let parsed: HeatmapPointCreate = serde_json::from_str(
            r#"{"latitude": 1.0, "longitude": 2.0, "intensity": 0.1, "meta_data": "x"}"#,
        )
        .unwrap();

        assert_eq!(parsed.meta_data, None);
        assert_eq!(parsed.source, None);
    }

    #[test]
    fn test_query_defaults() {
        let (bounds, page) = HeatmapQuery::default().validate().unwrap();

        assert_eq!(bounds, None);
        assert_eq!(
            page,
            Pagination {
                limit: 1000,
                offset: 0
            }
        );
    }

    #[test]
    fn test_query_partial_bounds_are_ignored() {
        let query = HeatmapQuery {
            min_lat: Some(10.0),
            max_lat: Some(20.0),
            ..Default::default()
        };

        assert_eq!(query.validate().unwrap().0, None);
    }

    #[test]
    fn test_query_bounds() {
        let query = HeatmapQuery {
            min_lat: Some(10.0),
            max_lat: Some(20.0),
            min_lon: Some(-5.0),
            max_lon: Some(5.0),
            limit: Some(50),
            offset: Some(100),
        };

        let (bounds, page) = query.validate().unwrap();
        assert_eq!(bounds.unwrap().max_lon, 5.0);
        assert_eq!(page.offset, 100);
    }

    #[test]
    fn test_query_inverted_bounds() {
        let query = HeatmapQuery {
            min_lat: Some(20.0),
            max_lat: Some(20.0),
            min_lon: Some(-5.0),
            max_lon: Some(5.0),
            ..Default::default()
        };

        assert!(matches!(query.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_query_out_of_range() {
        let query = HeatmapQuery {
            min_lat: Some(-95.0),
            limit: Some(MAX_LIMIT + 1),
            ..Default::default()
        };

        assert_eq!(fields(query.validate().unwrap_err()), vec!["min_lat", "limit"]);
    }
}
