pub mod geo;
pub mod lifecycle;
pub mod location_feed;
pub mod state_machine;
