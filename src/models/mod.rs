pub mod geofence;
pub mod job;
pub mod location;
pub mod session;
