use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    config::Config, database::init_postgres, error::AppError, repository::HeatmapRepository,
    storage::ObjectStorage,
};

pub struct State {
    pub config: Config,
    pub pool: PgPool,
    pub repository: HeatmapRepository,
    pub storage: ObjectStorage,
}

impl State {
    pub async fn new() -> Result<Arc<Self>, AppError> {
        let config = Config::load()?;

        info!("Connecting to the database...");
        let pool = init_postgres(&config).await?;

        info!("Connecting to object storage...");
        let storage = ObjectStorage::connect(&config)?;
        storage.ensure_buckets().await?;

        Ok(Self::from_parts(config, pool, storage))
    }

    pub fn from_parts(config: Config, pool: PgPool, storage: ObjectStorage) -> Arc<Self> {
        Arc::new(Self {
            config,
            repository: HeatmapRepository::new(pool.clone()),
            pool,
            storage,
        })
    }
}
