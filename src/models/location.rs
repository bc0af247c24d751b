use serde::{Deserialize, Serialize};

/// A geographic coordinate in decimal degrees.
///
/// Internal convention is `{lat, lng}`. Persisted payloads and the
/// telematics provider use GeoJSON-style `[longitude, latitude]` pairs;
/// conversion happens only through [`Location::from_wire_pair`] and
/// [`Location::to_wire_pair`] so the two conventions never mix in core
/// logic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build from a GeoJSON-style `[longitude, latitude]` wire pair.
    pub fn from_wire_pair(pair: [f64; 2]) -> Self {
        Self {
            lat: pair[1],
            lng: pair[0],
        }
    }

    /// Convert to a GeoJSON-style `[longitude, latitude]` wire pair.
    pub fn to_wire_pair(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}
