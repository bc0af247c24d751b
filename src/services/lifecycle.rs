//! Lifecycle controller: wires geofence evaluation, the status state
//! machine, and location samples to the job repository.
//!
//! Transition attempts for a job are serialized through a per-job mutex, and
//! guards always run against the freshly re-read persisted status, never a
//! caller-supplied snapshot. Persistence itself is compare-and-set on the
//! prior status, so even a writer outside this process surfaces as a
//! conflict rather than a lost update.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{JobRepository, RepositoryError};
use crate::models::geofence::GeofenceError;
use crate::models::job::{Assignment, Completion, HaulJob};
use crate::models::location::Location;
use crate::models::session::DriverSession;
use crate::services::geo;
use crate::services::location_feed::{self, LocationError, LocationSource};
use crate::services::state_machine::{self, JobStatus, TransitionGuard};

/// Policy for the arrival edge when a job has no pickup geofence. A
/// deployment chooses one explicitly; absence of a fence never silently
/// means "always allowed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingGeofencePolicy {
    /// Manual "mark arrived" is allowed; the automatic edge stays disabled.
    AllowManual,
    /// Arrival is blocked until a pickup geofence is configured on the job.
    RequireGeofence,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("transition guard failed: {reason}")]
    GuardFailed {
        reason: String,
        distance_to_boundary_m: Option<f64>,
    },

    #[error("job not found")]
    JobNotFound,

    #[error("malformed geofence: {0}")]
    MalformedGeofence(#[from] GeofenceError),

    #[error("location unavailable: {0}")]
    LocationUnavailable(#[from] LocationError),

    #[error("job was modified concurrently, retry")]
    Conflict,

    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::JobNotFound,
            RepositoryError::Conflict => Self::Conflict,
            RepositoryError::MalformedGeofence(g) => Self::MalformedGeofence(g),
            other => Self::Repository(other),
        }
    }
}

fn guard_failed(reason: &str) -> LifecycleError {
    LifecycleError::GuardFailed {
        reason: reason.to_string(),
        distance_to_boundary_m: None,
    }
}

/// Containment feedback for the operator UI.
#[derive(Debug, Clone, Serialize)]
pub struct Containment {
    pub inside: bool,
    pub distance_to_boundary_m: f64,
}

/// Outcome of running one location sample against a job.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub status: JobStatus,
    pub transitioned: bool,
    /// `None` when the job has no pickup geofence configured.
    pub containment: Option<Containment>,
}

/// Whatever parts the requested edge's guard needs.
#[derive(Debug, Clone, Default)]
pub struct TransitionPayload {
    pub assignment: Option<Assignment>,
    pub completion: Option<Completion>,
    pub location: Option<Location>,
}

impl TransitionPayload {
    pub fn with_assignment(assignment: Assignment) -> Self {
        Self {
            assignment: Some(assignment),
            ..Self::default()
        }
    }

    pub fn with_completion(completion: Completion) -> Self {
        Self {
            completion: Some(completion),
            ..Self::default()
        }
    }

    pub fn with_location(location: Location) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }
}

pub struct LifecycleController {
    repo: Arc<dyn JobRepository>,
    policy: MissingGeofencePolicy,
    job_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LifecycleController {
    pub fn new(repo: Arc<dyn JobRepository>, policy: MissingGeofencePolicy) -> Self {
        Self {
            repo,
            policy,
            job_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serialize automatic (feed-driven) and manual transition attempts for
    /// one job.
    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.job_locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one location sample against a job.
    ///
    /// While the job is `en_route` and the sample falls inside the pickup
    /// geofence, commits the automatic `en_route -> on_site` transition.
    /// Outside the fence, or at `on_site` and beyond, this is a no-op that
    /// only reports containment and distance for operator feedback; repeated
    /// calls never re-trigger the transition or bump `updated_at`.
    pub async fn evaluate(
        &self,
        job_id: Uuid,
        location: Location,
    ) -> Result<Evaluation, LifecycleError> {
        let started = Instant::now();
        let lock = self.lock_for(job_id).await;
        let _guard = lock.lock().await;

        let job = self.repo.get_by_id(job_id).await?;

        let containment = match &job.pickup_geofence {
            Some(fence) => Some(Containment {
                inside: geo::contains(fence, location)?,
                distance_to_boundary_m: geo::distance_to_boundary_m(fence, location)?,
            }),
            None => None,
        };

        metrics::counter!("geofence_evaluations_total").increment(1);
        metrics::histogram!("geofence_evaluation_seconds")
            .record(started.elapsed().as_secs_f64());

        if job.status != JobStatus::EnRoute {
            return Ok(Evaluation {
                status: job.status,
                transitioned: false,
                containment,
            });
        }

        match &containment {
            Some(c) if c.inside => {
                let mut updated = job.clone();
                updated.status = JobStatus::OnSite;
                updated.updated_at = Utc::now();
                let persisted = self.repo.update(&updated, JobStatus::EnRoute).await?;

                tracing::info!(
                    job_id = %job_id,
                    "location inside pickup geofence, job marked on site"
                );
                metrics::counter!("job_transitions_total").increment(1);

                Ok(Evaluation {
                    status: persisted.status,
                    transitioned: true,
                    containment,
                })
            }
            // Outside the fence, or no fence configured: the automatic edge
            // stays disabled and the sample is only reported.
            _ => Ok(Evaluation {
                status: job.status,
                transitioned: false,
                containment,
            }),
        }
    }

    /// Point-in-time check: fetch a single fix from `source` and evaluate
    /// it. Location acquisition is bounded by the fix timeout and surfaces
    /// as [`LifecycleError::LocationUnavailable`], never a hang.
    pub async fn evaluate_current(
        &self,
        job_id: Uuid,
        source: &dyn LocationSource,
    ) -> Result<Evaluation, LifecycleError> {
        let location = location_feed::fetch_once(source).await?;
        self.evaluate(job_id, location).await
    }

    /// Validate and commit an explicit transition request.
    ///
    /// Business-rule violations come back as [`LifecycleError`] values
    /// (`InvalidTransition`, `GuardFailed`), leaving the job unchanged.
    pub async fn request_transition(
        &self,
        job_id: Uuid,
        to: JobStatus,
        payload: TransitionPayload,
        actor: &DriverSession,
    ) -> Result<HaulJob, LifecycleError> {
        let lock = self.lock_for(job_id).await;
        let _guard = lock.lock().await;

        let job = self.repo.get_by_id(job_id).await?;
        let from = job.status;
        let rule = state_machine::rule_for(from, to)
            .map_err(|e| LifecycleError::InvalidTransition {
                from: e.from,
                to: e.to,
            })?;

        let mut updated = job.clone();

        match rule.guard {
            TransitionGuard::None => {}
            TransitionGuard::Assignment => {
                let assignment = payload
                    .assignment
                    .as_ref()
                    .ok_or_else(|| guard_failed("assignment details are required to accept a job"))?;
                if assignment.truck_number.trim().is_empty()
                    || assignment.driver_name.trim().is_empty()
                    || assignment.starting_location.trim().is_empty()
                {
                    return Err(guard_failed(
                        "truck number, driver name and starting location must be non-empty",
                    ));
                }
                updated.assignment = Some(assignment.clone());
                updated.hauler_ref = Some(actor.driver_code.clone());
            }
            TransitionGuard::PickupGeofence => match &job.pickup_geofence {
                Some(fence) => {
                    let location = payload.location.ok_or_else(|| {
                        guard_failed("a location sample is required to mark arrival")
                    })?;
                    if !geo::contains(fence, location)? {
                        let distance = geo::distance_to_boundary_m(fence, location)?;
                        return Err(LifecycleError::GuardFailed {
                            reason: format!("{distance:.0} m outside the pickup zone"),
                            distance_to_boundary_m: Some(distance),
                        });
                    }
                }
                None => match self.policy {
                    MissingGeofencePolicy::AllowManual => {}
                    MissingGeofencePolicy::RequireGeofence => {
                        return Err(guard_failed(
                            "arrival is blocked until a pickup geofence is configured",
                        ));
                    }
                },
            },
            TransitionGuard::Completion => {
                let completion = payload
                    .completion
                    .as_ref()
                    .ok_or_else(|| guard_failed("a completion payload is required"))?;
                if completion.delivery_confirmation.trim().is_empty() {
                    return Err(guard_failed("delivery confirmation must be non-empty"));
                }
                updated.completion = Some(completion.clone());
            }
            TransitionGuard::Admin => {
                if !actor.is_admin {
                    return Err(guard_failed(
                        "administrative action requires an admin actor",
                    ));
                }
            }
        }

        let now = Utc::now();
        updated.status = to;
        updated.updated_at = now;
        match to {
            JobStatus::Approved => updated.approved_at = Some(now),
            JobStatus::Completed => updated.completed_at = Some(now),
            JobStatus::Verified => updated.verified_at = Some(now),
            // Administrative reopen sends the job back through the operator
            // track; completion stamps no longer describe it.
            JobStatus::Accepted if from == JobStatus::Verified => {
                updated.completed_at = None;
                updated.verified_at = None;
                updated.completion = None;
            }
            _ => {}
        }

        let persisted = self.repo.update(&updated, from).await?;

        tracing::info!(
            job_id = %job_id,
            from = %from,
            to = %to,
            actor = %actor.driver_code,
            "job transition committed"
        );
        metrics::counter!("job_transitions_total").increment(1);

        Ok(persisted)
    }
}
