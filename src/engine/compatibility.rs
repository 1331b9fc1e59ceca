use std::sync::Arc;

use crate::config::MatchingConfig;
use crate::error::DistanceError;
use crate::models::request::RideRequest;
use crate::ports::DistancePort;

/// Measurements gathered while checking a compatible pair; fed to the scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMetrics {
    pub pickup_km: f64,
    pub dropoff_km: f64,
    pub time_diff_ms: i64,
}

/// First constraint a pair violated.
#[derive(Debug, Clone)]
pub enum Incompatibility {
    VehicleTypeMismatch,
    ExceedsCapacity { total: u32, max: u32 },
    PickupTooFar { km: f64 },
    DropoffTooFar { km: f64 },
    OutsideTimeWindow { diff_ms: i64 },
    DistanceUnavailable(DistanceError),
}

impl Incompatibility {
    pub fn reason(&self) -> &'static str {
        match self {
            Incompatibility::VehicleTypeMismatch => "different vehicle types",
            Incompatibility::ExceedsCapacity { .. } => "exceeds passenger capacity",
            Incompatibility::PickupTooFar { .. } => "pickup too far",
            Incompatibility::DropoffTooFar { .. } => "dropoff too far",
            Incompatibility::OutsideTimeWindow { .. } => "time windows incompatible",
            Incompatibility::DistanceUnavailable(_) => "compatibility check failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Evaluation {
    Compatible(PairMetrics),
    Incompatible(Incompatibility),
}

impl Evaluation {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Evaluation::Compatible(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Evaluation::Compatible(_) => "compatible",
            Evaluation::Incompatible(why) => why.reason(),
        }
    }
}

/// Decides whether two requests can share a ride.
#[derive(Clone)]
pub struct CompatibilityEvaluator {
    config: MatchingConfig,
    distance: Arc<dyn DistancePort>,
}

impl CompatibilityEvaluator {
    pub fn new(config: MatchingConfig, distance: Arc<dyn DistancePort>) -> Self {
        Self { config, distance }
    }

    /// Checks constraints in a fixed order and stops at the first failure.
    /// The pair is put in id order first, so the outcome does not depend on
    /// argument order even if the distance provider is asymmetric.
    pub fn evaluate(&self, a: &RideRequest, b: &RideRequest) -> Evaluation {
        let (a, b) = if a.id <= b.id { (a, b) } else { (b, a) };

        if a.vehicle_type != b.vehicle_type {
            return Evaluation::Incompatible(Incompatibility::VehicleTypeMismatch);
        }

        let total = a.passenger_count.saturating_add(b.passenger_count);
        if total > self.config.max_passengers {
            return Evaluation::Incompatible(Incompatibility::ExceedsCapacity {
                total,
                max: self.config.max_passengers,
            });
        }

        let pickup_km = match self.distance.distance(&a.pickup, &b.pickup) {
            Ok(km) => km,
            Err(err) => {
                return Evaluation::Incompatible(Incompatibility::DistanceUnavailable(err));
            }
        };
        if !(pickup_km <= self.config.proximity_radius_km) {
            return Evaluation::Incompatible(Incompatibility::PickupTooFar { km: pickup_km });
        }

        let dropoff_km = match self.distance.distance(&a.dropoff, &b.dropoff) {
            Ok(km) => km,
            Err(err) => {
                return Evaluation::Incompatible(Incompatibility::DistanceUnavailable(err));
            }
        };
        if !(dropoff_km <= self.config.proximity_radius_km) {
            return Evaluation::Incompatible(Incompatibility::DropoffTooFar { km: dropoff_km });
        }

        let time_diff_ms = (a.requested_at - b.requested_at).num_milliseconds().abs();
        if time_diff_ms > self.config.time_window().num_milliseconds() {
            return Evaluation::Incompatible(Incompatibility::OutsideTimeWindow {
                diff_ms: time_diff_ms,
            });
        }

        Evaluation::Compatible(PairMetrics {
            pickup_km,
            dropoff_km,
            time_diff_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{CompatibilityEvaluator, Evaluation, Incompatibility};
    use crate::config::MatchingConfig;
    use crate::error::DistanceError;
    use crate::models::location::Location;
    use crate::models::request::{RideRequest, VehicleType};
    use crate::ports::{DistancePort, HaversineDistance};

    // Roughly 0.009 degrees of latitude per kilometre.
    const KM_LAT: f64 = 1.0 / 111.19;

    fn ride(
        id_seed: u128,
        vehicle_type: VehicleType,
        passengers: u32,
        pickup_offset_km: f64,
        offset_secs: i64,
    ) -> RideRequest {
        let at =
            Utc.with_ymd_and_hms(2026, 2, 10, 18, 0, 0).unwrap() + Duration::seconds(offset_secs);
        RideRequest {
            id: Uuid::from_u128(id_seed),
            pickup: Location::new("pickup", 19.0 + pickup_offset_km * KM_LAT, 72.8),
            dropoff: Location::new("dropoff", 19.2, 72.9),
            vehicle_type,
            passenger_count: passengers,
            requested_at: at,
            deadline: at + Duration::seconds(180),
        }
    }

    fn evaluator() -> CompatibilityEvaluator {
        CompatibilityEvaluator::new(MatchingConfig::default(), Arc::new(HaversineDistance))
    }

    #[test]
    fn nearby_rides_are_compatible() {
        let a = ride(1, VehicleType::Bike, 1, 0.0, 0);
        let b = ride(2, VehicleType::Bike, 1, 1.0, 10);

        match evaluator().evaluate(&a, &b) {
            Evaluation::Compatible(metrics) => {
                assert!((metrics.pickup_km - 1.0).abs() < 0.01);
                assert!(metrics.dropoff_km < 1e-9);
                assert_eq!(metrics.time_diff_ms, 10_000);
            }
            other => panic!("expected compatible, got {other:?}"),
        }
    }

    #[test]
    fn vehicle_type_is_checked_first() {
        let a = ride(1, VehicleType::Bike, 3, 10.0, 0);
        let b = ride(2, VehicleType::Car, 3, 0.0, 0);
        assert_eq!(evaluator().evaluate(&a, &b).reason(), "different vehicle types");
    }

    #[test]
    fn combined_passengers_over_capacity_are_rejected() {
        let e = ride(1, VehicleType::Car, 3, 0.0, 0);
        let f = ride(2, VehicleType::Car, 2, 0.0, 0);

        let result = evaluator().evaluate(&e, &f);
        assert!(matches!(
            result,
            Evaluation::Incompatible(Incompatibility::ExceedsCapacity { total: 5, max: 4 })
        ));
    }

    #[test]
    fn distant_pickup_is_rejected() {
        let a = ride(1, VehicleType::Bike, 1, 0.0, 0);
        let c = ride(2, VehicleType::Bike, 1, 3.0, 10);

        let result = evaluator().evaluate(&a, &c);
        assert!(!result.is_compatible());
        assert_eq!(result.reason(), "pickup too far");
    }

    #[test]
    fn requests_outside_time_window_are_rejected() {
        let a = ride(1, VehicleType::Taxi, 1, 0.0, 0);
        let b = ride(2, VehicleType::Taxi, 1, 0.5, 31 * 60);
        assert_eq!(evaluator().evaluate(&a, &b).reason(), "time windows incompatible");
    }

    #[test]
    fn evaluation_is_symmetric() {
        let rides = [
            ride(1, VehicleType::Bike, 1, 0.0, 0),
            ride(2, VehicleType::Bike, 2, 1.5, 600),
            ride(3, VehicleType::Bike, 3, 2.5, 60),
            ride(4, VehicleType::Auto, 1, 0.2, 0),
            ride(5, VehicleType::Bike, 1, 0.1, 3_600),
        ];
        let evaluator = evaluator();

        for a in &rides {
            for b in &rides {
                assert_eq!(
                    evaluator.evaluate(a, b).is_compatible(),
                    evaluator.evaluate(b, a).is_compatible(),
                    "asymmetric for {} / {}",
                    a.id,
                    b.id
                );
            }
        }
    }

    /// Signed latitude difference: `distance(a, b) == -distance(b, a)`.
    struct OneWayStreet;

    impl DistancePort for OneWayStreet {
        fn distance(&self, from: &Location, to: &Location) -> Result<f64, DistanceError> {
            match (from.coordinates, to.coordinates) {
                (Some(a), Some(b)) => Ok((a.lat - b.lat) / KM_LAT),
                _ => Err(DistanceError::MissingCoordinates(from.address.clone())),
            }
        }
    }

    #[test]
    fn evaluation_is_symmetric_with_one_way_distances() {
        let evaluator =
            CompatibilityEvaluator::new(MatchingConfig::default(), Arc::new(OneWayStreet));
        let rides = [
            ride(1, VehicleType::Bike, 1, 0.0, 0),
            ride(2, VehicleType::Bike, 1, 3.0, 0),
            ride(3, VehicleType::Bike, 1, -3.0, 0),
            ride(4, VehicleType::Bike, 1, 1.0, 0),
        ];

        for a in &rides {
            for b in &rides {
                let forward = evaluator.evaluate(a, b);
                let backward = evaluator.evaluate(b, a);
                assert_eq!(forward.is_compatible(), backward.is_compatible());
                assert_eq!(forward.reason(), backward.reason());
            }
        }

        // Measured from the lower id the pickups are -3 km apart, which is
        // inside the radius whichever way round the pair is passed.
        assert!(evaluator.evaluate(&rides[0], &rides[1]).is_compatible());
        assert!(evaluator.evaluate(&rides[1], &rides[0]).is_compatible());
    }

    struct Unreachable;

    impl DistancePort for Unreachable {
        fn distance(&self, _from: &Location, _to: &Location) -> Result<f64, DistanceError> {
            Err(DistanceError::Provider("routing backend offline".to_string()))
        }
    }

    #[test]
    fn provider_failure_counts_as_incompatible() {
        let evaluator =
            CompatibilityEvaluator::new(MatchingConfig::default(), Arc::new(Unreachable));
        let a = ride(1, VehicleType::Bike, 1, 0.0, 0);
        let b = ride(2, VehicleType::Bike, 1, 0.0, 0);

        let result = evaluator.evaluate(&a, &b);
        assert!(matches!(
            result,
            Evaluation::Incompatible(Incompatibility::DistanceUnavailable(_))
        ));
    }
}
