use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::geofence::Geofence;
use crate::services::state_machine::JobStatus;

/// Assignment details supplied when an operator accepts a job. Present on a
/// job if and only if its status is at or past `accepted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub truck_number: String,
    pub driver_name: String,
    pub starting_location: String,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Delivery confirmation submitted when the hauling work is finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub delivery_confirmation: String,
    pub can_tracking: Option<String>,
    pub photo_ref: Option<String>,
}

/// One hauling assignment (purchase order), tracked through the status
/// lifecycle. Jobs are archived by status, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HaulJob {
    pub id: Uuid,
    pub client_ref: String,
    /// Driver code of the accepting operator; `None` until accepted.
    pub hauler_ref: Option<String>,
    pub job_details: String,
    pub material_type: String,
    #[serde(default, with = "crate::models::geofence::wire_opt")]
    pub pickup_geofence: Option<Geofence>,
    #[serde(default, with = "crate::models::geofence::wire_opt")]
    pub dropoff_geofence: Option<Geofence>,
    pub status: JobStatus,
    pub assignment: Option<Assignment>,
    pub completion: Option<Completion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl HaulJob {
    /// New purchase order in its initial status (`pending_approval` when the
    /// client requires sign-off, otherwise directly `available`).
    pub fn new(
        client_ref: String,
        job_details: String,
        material_type: String,
        pickup_geofence: Option<Geofence>,
        dropoff_geofence: Option<Geofence>,
        requires_approval: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_ref,
            hauler_ref: None,
            job_details,
            material_type,
            pickup_geofence,
            dropoff_geofence,
            status: if requires_approval {
                JobStatus::PendingApproval
            } else {
                JobStatus::Available
            },
            assignment: None,
            completion: None,
            created_at: now,
            updated_at: now,
            approved_at: None,
            completed_at: None,
            verified_at: None,
        }
    }
}
