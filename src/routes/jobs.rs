//! Job / purchase-order API handlers.
//!
//! Handlers stay thin: DTO validation, wire-format conversion, and mapping
//! lifecycle errors onto HTTP statuses. All business rules live in the
//! lifecycle controller.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::geofence::{Geofence, GeofenceWire};
use crate::models::job::{Assignment, Completion, HaulJob};
use crate::models::location::Location;
use crate::models::session::DriverSession;
use crate::services::lifecycle::{Evaluation, LifecycleError, TransitionPayload};
use crate::services::state_machine::JobStatus;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_boundary_m: Option<f64>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn lifecycle_error(err: LifecycleError) -> ApiError {
    let status = match &err {
        LifecycleError::InvalidTransition { .. } | LifecycleError::Conflict => {
            StatusCode::CONFLICT
        }
        LifecycleError::GuardFailed { .. } | LifecycleError::MalformedGeofence(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LifecycleError::JobNotFound => StatusCode::NOT_FOUND,
        LifecycleError::LocationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LifecycleError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if let LifecycleError::InvalidTransition { from, to } = &err {
        // The UI should never offer an illegal edge; log it as a client bug.
        tracing::warn!(from = %from, to = %to, "transition request for unlisted edge");
    }
    if let LifecycleError::Repository(ref e) = err {
        tracing::error!(error = %e, "repository failure");
    }

    let distance = match &err {
        LifecycleError::GuardFailed {
            distance_to_boundary_m,
            ..
        } => *distance_to_boundary_m,
        _ => None,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            distance_to_boundary_m: distance,
        }),
    )
}

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message,
            distance_to_boundary_m: None,
        }),
    )
}

/// Operator identity on a request. Authentication happens at the gateway;
/// this only attributes the action.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SessionDto {
    #[garde(length(min = 1, max = 100))]
    pub driver_name: String,
    #[garde(length(min = 1, max = 40))]
    pub driver_code: String,
    #[garde(skip)]
    #[serde(default)]
    pub is_admin: bool,
}

impl From<SessionDto> for DriverSession {
    fn from(dto: SessionDto) -> Self {
        Self {
            driver_name: dto.driver_name,
            driver_code: dto.driver_code,
            login_time: Utc::now(),
            is_admin: dto.is_admin,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 1, max = 100))]
    pub client_ref: String,
    #[garde(length(max = 2000))]
    #[serde(default)]
    pub job_details: String,
    #[garde(length(min = 1, max = 100))]
    pub material_type: String,
    #[garde(skip)]
    pub pickup_geofence: Option<GeofenceWire>,
    #[garde(skip)]
    pub dropoff_geofence: Option<GeofenceWire>,
    /// When set, the PO starts in `pending_approval` and needs client
    /// sign-off before it can be published to haulers.
    #[garde(skip)]
    #[serde(default)]
    pub requires_approval: bool,
}

/// POST /api/v1/jobs — create a purchase order.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<HaulJob>), ApiError> {
    request.validate().map_err(|e| bad_request(e.to_string()))?;

    let pickup = decode_geofence(request.pickup_geofence)?;
    let dropoff = decode_geofence(request.dropoff_geofence)?;

    let job = HaulJob::new(
        request.client_ref,
        request.job_details,
        request.material_type,
        pickup,
        dropoff,
        request.requires_approval,
    );

    state
        .repo
        .insert(&job)
        .await
        .map_err(|e| lifecycle_error(e.into()))?;

    tracing::info!(job_id = %job.id, client_ref = %job.client_ref, "purchase order created");
    metrics::counter!("jobs_created_total").increment(1);

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs/:id — fetch a job with its current status.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<HaulJob>, ApiError> {
    let job = state
        .repo
        .get_by_id(job_id)
        .await
        .map_err(|e| lifecycle_error(e.into()))?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptJobRequest {
    #[garde(dive)]
    pub session: SessionDto,
    #[garde(length(min = 1, max = 40))]
    pub truck_number: String,
    #[garde(length(min = 1, max = 200))]
    pub starting_location: String,
    #[garde(skip)]
    pub estimated_arrival: Option<DateTime<Utc>>,
    #[garde(length(max = 1000))]
    pub notes: Option<String>,
}

/// POST /api/v1/jobs/:id/accept — operator takes the job.
pub async fn accept_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<AcceptJobRequest>,
) -> Result<Json<HaulJob>, ApiError> {
    request.validate().map_err(|e| bad_request(e.to_string()))?;

    let assignment = Assignment {
        truck_number: request.truck_number,
        driver_name: request.session.driver_name.clone(),
        starting_location: request.starting_location,
        estimated_arrival: request.estimated_arrival,
        notes: request.notes,
    };
    let session = DriverSession::from(request.session);

    let job = state
        .lifecycle
        .request_transition(
            job_id,
            JobStatus::Accepted,
            TransitionPayload::with_assignment(assignment),
            &session,
        )
        .await
        .map_err(lifecycle_error)?;

    Ok(Json(job))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    #[garde(dive)]
    pub session: SessionDto,
    #[garde(skip)]
    pub to: JobStatus,
    /// GeoJSON-style `[lng, lat]` sample for geofence-guarded edges.
    #[garde(skip)]
    pub location: Option<[f64; 2]>,
    #[garde(length(max = 500))]
    pub delivery_confirmation: Option<String>,
    #[garde(length(max = 100))]
    pub can_tracking: Option<String>,
    #[garde(length(max = 200))]
    pub photo_ref: Option<String>,
}

/// POST /api/v1/jobs/:id/transition — explicit status transition request.
pub async fn transition_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<HaulJob>, ApiError> {
    request.validate().map_err(|e| bad_request(e.to_string()))?;

    let mut payload = TransitionPayload {
        location: request.location.map(Location::from_wire_pair),
        ..TransitionPayload::default()
    };
    if let Some(delivery_confirmation) = request.delivery_confirmation {
        payload.completion = Some(Completion {
            delivery_confirmation,
            can_tracking: request.can_tracking,
            photo_ref: request.photo_ref,
        });
    }
    let session = DriverSession::from(request.session);

    let job = state
        .lifecycle
        .request_transition(job_id, request.to, payload, &session)
        .await
        .map_err(lifecycle_error)?;

    Ok(Json(job))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LocationSampleRequest {
    /// GeoJSON-style `[lng, lat]` pair from the operator's device.
    #[garde(skip)]
    pub coordinates: [f64; 2],
}

#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub evaluation: Evaluation,
}

/// POST /api/v1/jobs/:id/location — push one location sample; may commit
/// the automatic arrival transition.
pub async fn push_location(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<LocationSampleRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let location = Location::from_wire_pair(request.coordinates);

    let evaluation = state
        .lifecycle
        .evaluate(job_id, location)
        .await
        .map_err(lifecycle_error)?;

    Ok(Json(EvaluationResponse { job_id, evaluation }))
}

fn decode_geofence(wire: Option<GeofenceWire>) -> Result<Option<Geofence>, ApiError> {
    wire.map(Geofence::try_from)
        .transpose()
        .map_err(|e| lifecycle_error(LifecycleError::MalformedGeofence(e)))
}
