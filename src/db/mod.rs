use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::models::geofence::GeofenceError;
use crate::models::job::HaulJob;
use crate::services::state_machine::JobStatus;

pub mod memory;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("job not found")]
    NotFound,

    /// The compare-and-set status precondition failed: another writer moved
    /// the job between read and update.
    #[error("job status changed concurrently")]
    Conflict,

    #[error("stored status is not a known value: {0}")]
    InvalidStatus(String),

    #[error("stored geofence is malformed: {0}")]
    MalformedGeofence(#[from] GeofenceError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Abstract persistence for haul jobs. The lifecycle engine only ever needs
/// get-by-id and a guarded update; it never assumes a storage engine.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<HaulJob, RepositoryError>;

    async fn insert(&self, job: &HaulJob) -> Result<(), RepositoryError>;

    /// Persist `job` only while the stored status still equals `expected`
    /// (compare-and-set). A lost race yields [`RepositoryError::Conflict`]
    /// and leaves the stored row untouched.
    async fn update(&self, job: &HaulJob, expected: JobStatus) -> Result<HaulJob, RepositoryError>;
}
