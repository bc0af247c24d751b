//! PostgreSQL-backed job repository. Geofences, assignment and completion
//! payloads are stored as JSONB in their wire representation.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::{JobRepository, RepositoryError};
use crate::models::geofence::{Geofence, GeofenceWire};
use crate::models::job::{Assignment, Completion, HaulJob};
use crate::services::state_machine::JobStatus;

const JOB_COLUMNS: &str = "id, client_ref, hauler_ref, job_details, material_type, \
     pickup_geofence, dropoff_geofence, status, assignment, completion, \
     created_at, updated_at, approved_at, completed_at, verified_at";

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<HaulJob, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM haul_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => map_job_row(&row),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn insert(&self, job: &HaulJob) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO haul_jobs
                (id, client_ref, hauler_ref, job_details, material_type,
                 pickup_geofence, dropoff_geofence, status, assignment, completion,
                 created_at, updated_at, approved_at, completed_at, verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(job.id)
        .bind(&job.client_ref)
        .bind(&job.hauler_ref)
        .bind(&job.job_details)
        .bind(&job.material_type)
        .bind(geofence_json(&job.pickup_geofence)?)
        .bind(geofence_json(&job.dropoff_geofence)?)
        .bind(job.status.to_string())
        .bind(json_opt(&job.assignment)?)
        .bind(json_opt(&job.completion)?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.approved_at)
        .bind(job.completed_at)
        .bind(job.verified_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, job: &HaulJob, expected: JobStatus) -> Result<HaulJob, RepositoryError> {
        // Guarded write: the WHERE clause is the compare-and-set on status.
        let row = sqlx::query(&format!(
            r#"
            UPDATE haul_jobs
            SET hauler_ref = $3,
                pickup_geofence = $4,
                dropoff_geofence = $5,
                status = $6,
                assignment = $7,
                completion = $8,
                updated_at = $9,
                approved_at = $10,
                completed_at = $11,
                verified_at = $12
            WHERE id = $1 AND status = $2
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(job.id)
        .bind(expected.to_string())
        .bind(&job.hauler_ref)
        .bind(geofence_json(&job.pickup_geofence)?)
        .bind(geofence_json(&job.dropoff_geofence)?)
        .bind(job.status.to_string())
        .bind(json_opt(&job.assignment)?)
        .bind(json_opt(&job.completion)?)
        .bind(job.updated_at)
        .bind(job.approved_at)
        .bind(job.completed_at)
        .bind(job.verified_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => map_job_row(&row),
            None => {
                // Distinguish a lost race from a missing row.
                let exists = sqlx::query("SELECT 1 FROM haul_jobs WHERE id = $1")
                    .bind(job.id)
                    .fetch_optional(&self.pool)
                    .await?;
                if exists.is_some() {
                    Err(RepositoryError::Conflict)
                } else {
                    Err(RepositoryError::NotFound)
                }
            }
        }
    }
}

fn geofence_json(fence: &Option<Geofence>) -> Result<Option<serde_json::Value>, RepositoryError> {
    fence
        .as_ref()
        .map(|f| serde_json::to_value(GeofenceWire::from(f)))
        .transpose()
        .map_err(RepositoryError::Serialize)
}

fn json_opt<T: serde::Serialize>(
    value: &Option<T>,
) -> Result<Option<serde_json::Value>, RepositoryError> {
    value
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(RepositoryError::Serialize)
}

fn decode_geofence(
    value: Option<serde_json::Value>,
) -> Result<Option<Geofence>, RepositoryError> {
    match value {
        Some(v) => {
            let wire: GeofenceWire = serde_json::from_value(v)?;
            Ok(Some(Geofence::try_from(wire)?))
        }
        None => Ok(None),
    }
}

fn map_job_row(row: &PgRow) -> Result<HaulJob, RepositoryError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| RepositoryError::InvalidStatus(status_str))?;

    let assignment: Option<Assignment> = row
        .try_get::<Option<serde_json::Value>, _>("assignment")?
        .map(serde_json::from_value)
        .transpose()?;
    let completion: Option<Completion> = row
        .try_get::<Option<serde_json::Value>, _>("completion")?
        .map(serde_json::from_value)
        .transpose()?;

    Ok(HaulJob {
        id: row.try_get("id")?,
        client_ref: row.try_get("client_ref")?,
        hauler_ref: row.try_get("hauler_ref")?,
        job_details: row.try_get("job_details")?,
        material_type: row.try_get("material_type")?,
        pickup_geofence: decode_geofence(row.try_get("pickup_geofence")?)?,
        dropoff_geofence: decode_geofence(row.try_get("dropoff_geofence")?)?,
        status,
        assignment,
        completion,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        approved_at: row.try_get("approved_at")?,
        completed_at: row.try_get("completed_at")?,
        verified_at: row.try_get("verified_at")?,
    })
}
