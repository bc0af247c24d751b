use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ephemeral operator identity attached to transition requests.
///
/// Credentials are verified upstream by the authentication collaborator; the
/// lifecycle engine only attributes actions and distinguishes administrative
/// actors for verify/reopen edges. Never persisted beyond the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSession {
    pub driver_name: String,
    pub driver_code: String,
    pub login_time: DateTime<Utc>,
    pub is_admin: bool,
}

impl DriverSession {
    pub fn operator(driver_name: &str, driver_code: &str) -> Self {
        Self {
            driver_name: driver_name.to_string(),
            driver_code: driver_code.to_string(),
            login_time: Utc::now(),
            is_admin: false,
        }
    }

    pub fn admin(driver_name: &str, driver_code: &str) -> Self {
        Self {
            is_admin: true,
            ..Self::operator(driver_name, driver_code)
        }
    }
}
