use geo::{HaversineDistance, Point};

use crate::types::Coordinate;

fn to_point(c: Coordinate) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

/// Great-circle distance in metres.
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let d = to_point(a).haversine_distance(&to_point(b));
    if d.is_finite() {
        d.max(0.0)
    } else {
        0.0
    }
}

/// Offset a coordinate by local north/east metres (small offsets only).
pub fn offset_m(origin: Coordinate, north_m: f64, east_m: f64) -> Coordinate {
    const R: f64 = 6_371_008.8;
    let d_lat = north_m / R;
    let d_lon = east_m / (R * origin.latitude.to_radians().cos());
    Coordinate::new(
        origin.latitude + d_lat.to_degrees(),
        origin.longitude + d_lon.to_degrees(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_distance() {
        let c = Coordinate::new(32.2, -110.9);
        assert_eq!(distance_m(c, c), 0.0);
    }

    #[test]
    fn test_offset_roundtrips_through_distance() {
        let origin = Coordinate::new(37.7749, -122.4194);
        let north = offset_m(origin, 100.0, 0.0);
        assert_relative_eq!(distance_m(origin, north), 100.0, max_relative = 1e-3);
        let east = offset_m(origin, 0.0, 250.0);
        assert_relative_eq!(distance_m(origin, east), 250.0, max_relative = 1e-3);
    }
}
