use sqlx::PgPool;

use crate::models::{Bounds, HeatmapDataset, HeatmapPoint, HeatmapPointCreate, Pagination, Statistics};

const POINT_COLUMNS: &str =
    "id, latitude, longitude, intensity, temperature, humidity, source, timestamp, meta_data";

const INSERT_POINT: &str = "INSERT INTO heatmap_points \
    (latitude, longitude, intensity, temperature, humidity, source, meta_data, geometry) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, ST_SetSRID(ST_MakePoint($2, $1), 4326))";

#[derive(Clone)]
pub struct HeatmapRepository {
    pool: PgPool,
}

impl HeatmapRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create_point(
        &self,
        point: &HeatmapPointCreate,
        source: Option<&str>,
    ) -> Result<HeatmapPoint, sqlx::Error> {
        let query = format!("{INSERT_POINT} RETURNING {POINT_COLUMNS}");

        sqlx::query_as::<_, HeatmapPoint>(&query)
            .bind(point.latitude)
            .bind(point.longitude)
            .bind(point.intensity)
            .bind(point.temperature)
            .bind(point.humidity)
            .bind(source.or(point.source.as_deref()))
            .bind(point.meta_data.as_deref())
            .fetch_one(&self.pool)
            .await
    }

    /// Inserts all points in one transaction; either every point lands or none.
    pub async fn create_points(
        &self,
        points: &[HeatmapPointCreate],
        source: &str,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for point in points {
            inserted += sqlx::query(INSERT_POINT)
                .bind(point.latitude)
                .bind(point.longitude)
                .bind(point.intensity)
                .bind(point.temperature)
                .bind(point.humidity)
                .bind(source)
                .bind(point.meta_data.as_deref())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        Ok(inserted)
    }

    pub async fn get_points_in_bounds(
        &self,
        bounds: &Bounds,
        page: Pagination,
    ) -> Result<Vec<HeatmapPoint>, sqlx::Error> {
        let query = format!(
            "SELECT {POINT_COLUMNS} FROM heatmap_points \
             WHERE latitude >= $1 AND latitude <= $2 AND longitude >= $3 AND longitude <= $4 \
             ORDER BY id LIMIT $5 OFFSET $6"
        );

        sqlx::query_as::<_, HeatmapPoint>(&query)
            .bind(bounds.min_lat)
            .bind(bounds.max_lat)
            .bind(bounds.min_lon)
            .bind(bounds.max_lon)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_all_points(&self, page: Pagination) -> Result<Vec<HeatmapPoint>, sqlx::Error> {
        let query = format!("SELECT {POINT_COLUMNS} FROM heatmap_points ORDER BY id LIMIT $1 OFFSET $2");

        sqlx::query_as::<_, HeatmapPoint>(&query)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_point_by_id(&self, id: i64) -> Result<Option<HeatmapPoint>, sqlx::Error> {
        let query = format!("SELECT {POINT_COLUMNS} FROM heatmap_points WHERE id = $1");

        sqlx::query_as::<_, HeatmapPoint>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn delete_point(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM heatmap_points WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_dataset(
        &self,
        name: &str,
        description: Option<&str>,
        file_path: Option<&str>,
        point_count: i32,
        extent: Option<&Bounds>,
    ) -> Result<HeatmapDataset, sqlx::Error> {
        sqlx::query_as::<_, HeatmapDataset>(
            "INSERT INTO heatmap_datasets (name, description, file_path, point_count, bounds) \
             VALUES ($1, $2, $3, $4, \
                CASE WHEN $5::float8 IS NULL THEN NULL \
                ELSE ST_MakeEnvelope($5, $6, $7, $8, 4326) END) \
             RETURNING id, name, description, created_at, file_path, point_count",
        )
        .bind(name)
        .bind(description)
        .bind(file_path)
        .bind(point_count)
        .bind(extent.map(|b| b.min_lon))
        .bind(extent.map(|b| b.min_lat))
        .bind(extent.map(|b| b.max_lon))
        .bind(extent.map(|b| b.max_lat))
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_statistics(&self) -> Result<Statistics, sqlx::Error> {
        sqlx::query_as::<_, Statistics>(
            "SELECT COUNT(id) AS total_points, \
                COALESCE(AVG(intensity), 0)::float8 AS average_intensity, \
                COALESCE(MAX(intensity), 0)::float8 AS max_intensity, \
                COALESCE(MIN(intensity), 0)::float8 AS min_intensity \
             FROM heatmap_points",
        )
        .fetch_one(&self.pool)
        .await
    }
}
