//! Geofence geometry: great-circle distance, containment, and
//! distance-to-boundary feedback for the job lifecycle.

use crate::models::geofence::{Geofence, GeofenceError};
use crate::models::location::Location;

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
/// Symmetric and non-negative; zero for identical points.
pub fn distance_m(a: Location, b: Location) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Whether `point` falls within the fence.
///
/// Circle boundaries are inclusive (`distance <= radius`). Polygon
/// containment uses ray casting over the implicitly closed ring; a point
/// exactly on an edge follows the ray-cast convention and callers should not
/// rely on exact edge semantics.
pub fn contains(fence: &Geofence, point: Location) -> Result<bool, GeofenceError> {
    fence.validate()?;
    match fence {
        Geofence::Circle { center, radius_m } => Ok(distance_m(point, *center) <= *radius_m),
        Geofence::Polygon { vertices } => Ok(point_in_ring(vertices, point)),
    }
}

/// Distance from `point` to the fence boundary in meters; 0 when inside.
///
/// Used for operator feedback ("250 m outside pickup zone"). Circles use
/// center distance minus radius; polygons use the nearest-edge distance in a
/// local equirectangular projection around the point.
pub fn distance_to_boundary_m(fence: &Geofence, point: Location) -> Result<f64, GeofenceError> {
    fence.validate()?;
    match fence {
        Geofence::Circle { center, radius_m } => {
            Ok((distance_m(point, *center) - radius_m).max(0.0))
        }
        Geofence::Polygon { vertices } => {
            if point_in_ring(vertices, point) {
                return Ok(0.0);
            }
            let n = vertices.len();
            let mut nearest = f64::INFINITY;
            for i in 0..n {
                let d = point_to_segment_m(point, vertices[i], vertices[(i + 1) % n]);
                if d < nearest {
                    nearest = d;
                }
            }
            Ok(nearest)
        }
    }
}

/// Ray casting over the closed vertex ring: count edge crossings of an
/// eastward ray from the point.
fn point_in_ring(ring: &[Location], p: Location) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (vi, vj) = (ring[i], ring[j]);
        if (vi.lat > p.lat) != (vj.lat > p.lat) {
            let lng_at_lat = vi.lng + (p.lat - vi.lat) * (vj.lng - vi.lng) / (vj.lat - vi.lat);
            if p.lng < lng_at_lat {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to the segment `a`-`b`, computed on a local tangent
/// plane centered at `p`. Accurate at geofence scale.
fn point_to_segment_m(p: Location, a: Location, b: Location) -> f64 {
    let cos_lat = p.lat.to_radians().cos();
    let project = |loc: Location| -> (f64, f64) {
        (
            (loc.lng - p.lng).to_radians() * cos_lat * EARTH_RADIUS_M,
            (loc.lat - p.lat).to_radians() * EARTH_RADIUS_M,
        )
    };
    let (ax, ay) = project(a);
    let (bx, by) = project(b);

    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    // Degenerate segment: both endpoints coincide.
    if len_sq == 0.0 {
        return (ax * ax + ay * ay).sqrt();
    }

    // Clamp the projection of the origin (the point) onto the segment.
    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(lat: f64, lng: f64, radius_m: f64) -> Geofence {
        Geofence::circle(Location::new(lat, lng), radius_m).unwrap()
    }

    // Roughly 0.01 degrees of latitude, in meters.
    const LAT_HUNDREDTH_M: f64 = 1_111.95;

    #[test]
    fn distance_is_symmetric_and_zero_on_identity() {
        let a = Location::new(40.0, -75.0);
        let b = Location::new(40.7, -74.0);
        assert_eq!(distance_m(a, a), 0.0);
        assert!((distance_m(a, b) - distance_m(b, a)).abs() < 1e-9);
        assert!(distance_m(a, b) > 0.0);
    }

    #[test]
    fn distance_matches_known_value() {
        // One hundredth of a degree of latitude is ~1111.95 m.
        let a = Location::new(40.0, -75.0);
        let b = Location::new(40.01, -75.0);
        assert!((distance_m(a, b) - LAT_HUNDREDTH_M).abs() < 1.0);
    }

    #[test]
    fn circle_contains_its_center() {
        let fence = circle(40.0, -75.0, 1.0);
        assert!(contains(&fence, Location::new(40.0, -75.0)).unwrap());
    }

    #[test]
    fn circle_containment_matches_distance() {
        let fence = circle(40.0, -75.0, 500.0);
        let inside = Location::new(40.003, -75.0); // ~334 m north
        let outside = Location::new(40.02, -75.0); // ~2224 m north
        assert!(contains(&fence, inside).unwrap());
        assert!(!contains(&fence, outside).unwrap());
    }

    #[test]
    fn circle_boundary_distance() {
        let fence = circle(40.0, -75.0, 500.0);
        let inside = Location::new(40.003, -75.0);
        let outside = Location::new(40.02, -75.0);
        assert_eq!(distance_to_boundary_m(&fence, inside).unwrap(), 0.0);

        let d = distance_to_boundary_m(&fence, outside).unwrap();
        let expected = distance_m(outside, Location::new(40.0, -75.0)) - 500.0;
        assert!((d - expected).abs() < 1e-6);
        assert!(d > 0.0);
    }

    fn unit_square() -> Geofence {
        // Convex ring around (0..0.01, 0..0.01) degrees.
        Geofence::polygon(vec![
            Location::new(0.0, 0.0),
            Location::new(0.0, 0.01),
            Location::new(0.01, 0.01),
            Location::new(0.01, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn polygon_contains_interior_point() {
        assert!(contains(&unit_square(), Location::new(0.005, 0.005)).unwrap());
    }

    #[test]
    fn polygon_excludes_far_outside_point() {
        assert!(!contains(&unit_square(), Location::new(10.0, 10.0)).unwrap());
        assert!(!contains(&unit_square(), Location::new(-0.005, 0.005)).unwrap());
    }

    #[test]
    fn polygon_boundary_distance_zero_inside() {
        assert_eq!(
            distance_to_boundary_m(&unit_square(), Location::new(0.005, 0.005)).unwrap(),
            0.0
        );
    }

    #[test]
    fn polygon_boundary_distance_outside() {
        // 0.01 degrees of latitude south of the bottom edge.
        let p = Location::new(-0.01, 0.005);
        let d = distance_to_boundary_m(&unit_square(), p).unwrap();
        assert!((d - LAT_HUNDREDTH_M).abs() < 5.0, "got {d}");
    }

    #[test]
    fn malformed_fence_is_an_error_not_outside() {
        let fence = Geofence::Circle {
            center: Location::new(40.0, -75.0),
            radius_m: 0.0,
        };
        assert_eq!(
            contains(&fence, Location::new(40.0, -75.0)),
            Err(GeofenceError::NonPositiveRadius(0.0))
        );

        let empty = Geofence::Polygon { vertices: vec![] };
        assert_eq!(
            distance_to_boundary_m(&empty, Location::new(0.0, 0.0)),
            Err(GeofenceError::TooFewVertices(0))
        );
    }
}
