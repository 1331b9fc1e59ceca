use crate::error::DistanceError;
use crate::models::location::{GeoPoint, Location};
use crate::ports::DistancePort;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between the coordinates attached to each location.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaversineDistance;

impl DistancePort for HaversineDistance {
    fn distance(&self, from: &Location, to: &Location) -> Result<f64, DistanceError> {
        let a = coordinates(from)?;
        let b = coordinates(to)?;
        Ok(haversine_km(&a, &b))
    }
}

fn coordinates(location: &Location) -> Result<GeoPoint, DistanceError> {
    location
        .coordinates
        .ok_or_else(|| DistanceError::MissingCoordinates(location.address.clone()))
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

#[cfg(test)]
mod tests {
    use super::HaversineDistance;
    use crate::error::DistanceError;
    use crate::models::location::Location;
    use crate::ports::DistancePort;

    #[test]
    fn same_place_is_zero_km() {
        let gateway = Location::new("Gateway of India", 18.9220, 72.8347);
        let km = HaversineDistance.distance(&gateway, &gateway).unwrap();
        assert!(km < 1e-9);
    }

    #[test]
    fn mumbai_to_pune_is_around_120_km() {
        let mumbai = Location::new("Mumbai", 19.0760, 72.8777);
        let pune = Location::new("Pune", 18.5204, 73.8567);

        let there = HaversineDistance.distance(&mumbai, &pune).unwrap();
        let back = HaversineDistance.distance(&pune, &mumbai).unwrap();

        assert!((there - 120.0).abs() < 5.0, "got {there}");
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn address_without_coordinates_is_an_error() {
        let known = Location::new("Thane", 19.2183, 72.9781);
        let unknown = Location {
            address: "somewhere".to_string(),
            coordinates: None,
        };

        let err = HaversineDistance.distance(&known, &unknown).unwrap_err();
        assert!(matches!(err, DistanceError::MissingCoordinates(addr) if addr == "somewhere"));
    }
}
