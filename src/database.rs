//! # PostGIS
//!
//! Relational store for heat points and imported datasets.
//!
//! ## Schema
//!
//! - `heatmap_points`: one row per measurement, latitude/longitude as plain
//!   columns (B-tree indexed, used by the bounds filter) plus a
//!   `GEOMETRY(POINT, 4326)` column derived from them (GiST indexed)
//! - `heatmap_datasets`: one row per GeoPackage import with its point count
//!   and extent
//!
//! Migrations live in `migrations/` and are embedded into the binary.
use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{config::Config, error::AppError};

const CONNECT_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn init_postgres(config: &Config) -> Result<PgPool, AppError> {
    let database_url = config.database_url()?;
    let options = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT);

    let mut attempt = 0;
    let pool = loop {
        match options.clone().connect(&database_url).await {
            Ok(pool) => break pool,
            Err(e) if attempt < CONNECT_RETRIES && is_transient(&e) => {
                attempt += 1;
                let backoff = RETRY_BACKOFF * 2u32.pow(attempt);
                warn!("Transient DB error: {e}. Retrying ({attempt}/{CONNECT_RETRIES}) in {backoff:?}");
                sleep(backoff).await;
            }
            Err(e) => {
                warn!("Could not connect to the database: {e}");
                return Err(e.into());
            }
        }
    };

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

fn is_transient(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&sqlx::Error::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionRefused
        ))));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }
}
