/// A (latitude, longitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for haversine::Location {
    fn from(point: LatLng) -> Self {
        haversine::Location {
            latitude: point.lat,
            longitude: point.lng,
        }
    }
}

/// Great-circle distance in kilometres (mean Earth radius 6371 km).
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    haversine::distance(a.into(), b.into(), haversine::Units::Kilometers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        let origin = LatLng::new(0.0, 0.0);
        assert_eq!(haversine_km(origin, origin), 0.0);
    }

    #[test]
    fn test_new_york_to_london() {
        let nyc = LatLng::new(40.7128, -74.006);
        let london = LatLng::new(51.5074, -0.1278);
        let d = haversine_km(nyc, london);
        assert!((d - 5570.0).abs() < 5570.0 * 0.01, "got {d}");
    }

    #[test]
    fn test_symmetric() {
        let tokyo = LatLng::new(35.6762, 139.6503);
        let sydney = LatLng::new(-33.8688, 151.2093);
        let there = haversine_km(tokyo, sydney);
        let back = haversine_km(sydney, tokyo);
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_is_short() {
        let west = LatLng::new(0.0, 179.5);
        let east = LatLng::new(0.0, -179.5);
        // one degree of longitude at the equator is ~111 km
        let d = haversine_km(west, east);
        assert!(d > 100.0 && d < 120.0, "got {d}");
    }
}
