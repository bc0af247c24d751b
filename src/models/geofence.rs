use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::location::Location;

/// Geometry validation failures. A malformed geofence is always an error,
/// never a silent "not contained" result, so callers can distinguish
/// "outside" from "misconfigured job".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeofenceError {
    #[error("circle radius must be positive, got {0}")]
    NonPositiveRadius(f64),

    #[error("polygon requires at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    #[error("polygon ring is self-intersecting")]
    SelfIntersecting,
}

/// A geographic region gating a job status transition. Owned by exactly one
/// job; a job may carry a pickup fence, a drop-off fence, both, or neither.
#[derive(Debug, Clone, PartialEq)]
pub enum Geofence {
    Circle { center: Location, radius_m: f64 },
    Polygon { vertices: Vec<Location> },
}

impl Geofence {
    /// Circular fence around `center`. Fails unless `radius_m > 0`.
    pub fn circle(center: Location, radius_m: f64) -> Result<Self, GeofenceError> {
        let fence = Self::Circle { center, radius_m };
        fence.validate()?;
        Ok(fence)
    }

    /// Polygonal fence over an implicitly closed vertex ring. Fails unless
    /// the ring has at least 3 vertices and is simple.
    pub fn polygon(vertices: Vec<Location>) -> Result<Self, GeofenceError> {
        let fence = Self::Polygon { vertices };
        fence.validate()?;
        Ok(fence)
    }

    pub fn validate(&self) -> Result<(), GeofenceError> {
        match self {
            Self::Circle { radius_m, .. } => {
                if *radius_m <= 0.0 {
                    return Err(GeofenceError::NonPositiveRadius(*radius_m));
                }
                Ok(())
            }
            Self::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(GeofenceError::TooFewVertices(vertices.len()));
                }
                if ring_self_intersects(vertices) {
                    return Err(GeofenceError::SelfIntersecting);
                }
                Ok(())
            }
        }
    }
}

/// Persisted geofence representation. Centers and vertices are GeoJSON-style
/// `[longitude, latitude]` pairs; this is the only place the wire ordinate
/// order meets the internal `{lat, lng}` type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceWire {
    Circle { center: [f64; 2], radius_m: f64 },
    Polygon { vertices: Vec<[f64; 2]> },
}

impl From<&Geofence> for GeofenceWire {
    fn from(fence: &Geofence) -> Self {
        match fence {
            Geofence::Circle { center, radius_m } => Self::Circle {
                center: center.to_wire_pair(),
                radius_m: *radius_m,
            },
            Geofence::Polygon { vertices } => Self::Polygon {
                vertices: vertices.iter().map(|v| v.to_wire_pair()).collect(),
            },
        }
    }
}

impl TryFrom<GeofenceWire> for Geofence {
    type Error = GeofenceError;

    fn try_from(wire: GeofenceWire) -> Result<Self, Self::Error> {
        match wire {
            GeofenceWire::Circle { center, radius_m } => {
                Geofence::circle(Location::from_wire_pair(center), radius_m)
            }
            GeofenceWire::Polygon { vertices } => Geofence::polygon(
                vertices.into_iter().map(Location::from_wire_pair).collect(),
            ),
        }
    }
}

/// Serde adapter for `Option<Geofence>` fields, routing through the wire
/// representation so persisted JSON keeps `[lng, lat]` ordinate order.
pub mod wire_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Geofence, GeofenceWire};

    pub fn serialize<S: Serializer>(
        value: &Option<Geofence>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(GeofenceWire::from)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Geofence>, D::Error> {
        match Option::<GeofenceWire>::deserialize(deserializer)? {
            Some(wire) => Geofence::try_from(wire)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// True when two non-adjacent edges of the ring properly cross. Runs on the
/// raw degree plane, which is adequate at geofence scale.
fn ring_self_intersects(vertices: &[Location]) -> bool {
    let n = vertices.len();
    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent edges share a vertex and may not be tested.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (a1, a2) = (vertices[i], vertices[(i + 1) % n]);
            let (b1, b2) = (vertices[j], vertices[(j + 1) % n]);
            if segments_cross(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

fn segments_cross(p1: Location, p2: Location, p3: Location, p4: Location) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

fn orientation(a: Location, b: Location, c: Location) -> f64 {
    (b.lng - a.lng) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lng - a.lng)
}
