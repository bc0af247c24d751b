use serde::Deserialize;
use uuid::Uuid;

use crate::services::lifecycle::MissingGeofencePolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Arrival policy for jobs without a pickup geofence. This is a
    /// deployment decision, never inferred from a missing fence.
    #[serde(default = "default_missing_geofence_policy")]
    pub missing_geofence_policy: MissingGeofencePolicy,

    /// Telematics position endpoint for the tracker worker
    #[serde(default)]
    pub telemetry_url: Option<String>,

    /// Worst acceptable horizontal accuracy for a position fix, in meters
    #[serde(default = "default_max_accuracy_m")]
    pub max_accuracy_m: f64,

    /// Continuous-tracking poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Job the tracker worker follows (tracker only)
    #[serde(default)]
    pub tracker_job_id: Option<Uuid>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_missing_geofence_policy() -> MissingGeofencePolicy {
    MissingGeofencePolicy::RequireGeofence
}

fn default_max_accuracy_m() -> f64 {
    100.0
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
