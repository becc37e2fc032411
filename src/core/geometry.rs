//! Area of a vertex ring on the sphere, converted to acres.
//!
//! Degenerate rings yield `None` so callers never persist `0` or `NaN` as a
//! derived size.

use super::entity::Coordinate;

/// Mean equatorial radius used by web map geometry libraries, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

pub const SQUARE_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Number of distinct vertices, ignoring the closing duplicate.
pub fn distinct_vertex_count(ring: &[Coordinate]) -> usize {
    let mut seen: Vec<Coordinate> = Vec::with_capacity(ring.len());
    for vertex in ring {
        if !seen.contains(vertex) {
            seen.push(*vertex);
        }
    }
    seen.len()
}

/// Spherical area enclosed by the ring in square meters.
///
/// Returns `None` for fewer than three distinct vertices or a non-finite sum.
pub fn ring_area_square_meters(ring: &[Coordinate]) -> Option<f64> {
    if distinct_vertex_count(ring) < 3 {
        return None;
    }

    let last = ring.last()?;

    let mut total = 0.0;
    let mut prev_tan_lat = half_colatitude_tan(last.lat);
    let mut prev_lng = last.lng.to_radians();

    for vertex in ring {
        let tan_lat = half_colatitude_tan(vertex.lat);
        let lng = vertex.lng.to_radians();
        total += polar_triangle_area(tan_lat, lng, prev_tan_lat, prev_lng);
        prev_tan_lat = tan_lat;
        prev_lng = lng;
    }

    let area = (total * EARTH_RADIUS_METERS * EARTH_RADIUS_METERS).abs();
    area.is_finite().then_some(area)
}

/// Ring area in acres rounded to two decimals.
pub fn ring_acres(ring: &[Coordinate]) -> Option<f64> {
    ring_area_square_meters(ring).map(|area| round_to_hundredths(area / SQUARE_METERS_PER_ACRE))
}

fn half_colatitude_tan(lat_degrees: f64) -> f64 {
    ((std::f64::consts::FRAC_PI_2 - lat_degrees.to_radians()) / 2.0).tan()
}

fn polar_triangle_area(tan1: f64, lng1: f64, tan2: f64, lng2: f64) -> f64 {
    let delta_lng = lng1 - lng2;
    let t = tan1 * tan2;
    2.0 * (t * delta_lng.sin()).atan2(1.0 + t * delta_lng.cos())
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size_degrees: f64) -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(size_degrees, 0.0),
            Coordinate::new(size_degrees, size_degrees),
            Coordinate::new(0.0, size_degrees),
            Coordinate::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_small_square_near_equator() {
        // 0.001 deg is ~111.32 m on this sphere, so ~12,392 m2 or ~3.06 acres.
        let acres = ring_acres(&square(0.001)).unwrap();
        assert!((acres - 3.06).abs() < 0.02, "got {acres}");
    }

    #[test]
    fn test_orientation_does_not_change_area() {
        let mut ring = square(0.002);
        let forward = ring_area_square_meters(&ring).unwrap();
        ring.reverse();
        let backward = ring_area_square_meters(&ring).unwrap();
        assert!((forward - backward).abs() < 1e-3);
    }

    #[test]
    fn test_open_and_closed_rings_agree() {
        let closed = square(0.001);
        let open = &closed[..closed.len() - 1];
        assert_eq!(ring_acres(open), ring_acres(&closed));
    }

    #[test]
    fn test_degenerate_rings_have_no_area() {
        assert_eq!(ring_acres(&[]), None);
        assert_eq!(ring_acres(&[Coordinate::new(1.0, 1.0)]), None);
        assert_eq!(
            ring_acres(&[Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0)]),
            None
        );
        // Two distinct vertices plus a closing duplicate is still a line.
        assert_eq!(
            ring_acres(&[
                Coordinate::new(1.0, 1.0),
                Coordinate::new(2.0, 2.0),
                Coordinate::new(1.0, 1.0),
            ]),
            None
        );
    }

    #[test]
    fn test_non_finite_vertices_have_no_area() {
        let ring = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(f64::NAN, 0.0),
            Coordinate::new(1.0, 1.0),
        ];
        assert_eq!(ring_acres(&ring), None);
    }
}
