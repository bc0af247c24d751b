//! Continuous-tracking worker.
//!
//! Follows one active job: polls the telematics provider for the driver's
//! position on the tracking interval and runs each fix through the lifecycle
//! controller, committing the automatic arrival transition when the driver
//! enters the pickup geofence. Failed fixes are logged and retried on the
//! next tick; tracking stops once the job moves past `en_route`.

use std::sync::Arc;
use std::time::Duration;

use haul_dispatch::{
    config::AppConfig,
    db::{self, queries::PgJobRepository},
    services::{
        lifecycle::{LifecycleController, LifecycleError},
        location_feed::{HttpLocationSource, LocationFeed},
        state_machine::JobStatus,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting haul-dispatch tracker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let job_id = config
        .tracker_job_id
        .expect("TRACKER_JOB_ID must be set for the tracker worker");
    let telemetry_url = config
        .telemetry_url
        .as_deref()
        .expect("TELEMETRY_URL must be set for the tracker worker");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let repo = Arc::new(PgJobRepository::new(db_pool));
    let lifecycle =
        LifecycleController::new(repo, config.missing_geofence_policy);

    let source = HttpLocationSource::new(telemetry_url, config.max_accuracy_m)
        .expect("Failed to initialize telematics location source");

    let (feed, mut samples) = LocationFeed::start(
        Arc::new(source),
        Duration::from_secs(config.poll_interval_secs),
    );

    tracing::info!(
        job_id = %job_id,
        interval_secs = config.poll_interval_secs,
        "Tracker ready, polling for position fixes"
    );

    while let Some(sample) = samples.recv().await {
        let location = match sample {
            Ok(location) => location,
            Err(e) => {
                // The feed already logged the failed fix; keep polling.
                tracing::debug!(error = %e, "skipping failed fix");
                continue;
            }
        };

        match lifecycle.evaluate(job_id, location).await {
            Ok(evaluation) => {
                if evaluation.transitioned {
                    tracing::info!(
                        job_id = %job_id,
                        status = %evaluation.status,
                        "arrival committed by tracker"
                    );
                }
                if let Some(c) = &evaluation.containment {
                    tracing::debug!(
                        job_id = %job_id,
                        inside = c.inside,
                        distance_m = c.distance_to_boundary_m,
                        "containment evaluated"
                    );
                }
                // Tracking only matters until arrival; afterwards the
                // operator drives the remaining transitions manually.
                if !matches!(evaluation.status, JobStatus::Accepted | JobStatus::EnRoute) {
                    tracing::info!(
                        job_id = %job_id,
                        status = %evaluation.status,
                        "job past en_route, stopping tracker"
                    );
                    break;
                }
            }
            Err(LifecycleError::JobNotFound) => {
                tracing::error!(job_id = %job_id, "tracked job no longer exists, stopping");
                break;
            }
            Err(LifecycleError::Conflict) => {
                // Another writer moved the job; the next fix re-reads it.
                tracing::debug!(job_id = %job_id, "concurrent update, will re-evaluate");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "evaluation failed, will retry");
            }
        }
    }

    // No further transition attempts fire after stop() returns.
    feed.stop();
    tracing::info!(job_id = %job_id, "Tracker stopped");
}
