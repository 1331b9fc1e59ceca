use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::engine::compatibility::PairMetrics;
use crate::models::matching::ScoreBreakdown;
use crate::models::request::RideRequest;

const MAX_COMPONENT: f64 = 100.0;
const DISTANCE_PENALTY_PER_KM: f64 = 10.0;
const MS_PER_MINUTE: f64 = 60_000.0;
const SAME_PARTY_SIZE_BONUS: f64 = 20.0;

/// Ranks a compatible pair; higher is better and never negative.
pub fn compute_score(
    a: &RideRequest,
    b: &RideRequest,
    metrics: &PairMetrics,
) -> (u32, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        distance_score: distance_score(metrics.pickup_km, metrics.dropoff_km),
        time_score: time_score(metrics.time_diff_ms),
        passenger_score: passenger_score(a.passenger_count, b.passenger_count),
    };

    (total_score(&breakdown), breakdown)
}

pub fn total_score(breakdown: &ScoreBreakdown) -> u32 {
    let total = breakdown.distance_score + breakdown.time_score + breakdown.passenger_score;
    if total.is_finite() {
        total.round().max(0.0) as u32
    } else {
        0
    }
}

fn distance_score(pickup_km: f64, dropoff_km: f64) -> f64 {
    let score = MAX_COMPONENT - (pickup_km + dropoff_km) * DISTANCE_PENALTY_PER_KM;
    if score.is_nan() { 0.0 } else { score.max(0.0) }
}

fn time_score(time_diff_ms: i64) -> f64 {
    (MAX_COMPONENT - time_diff_ms.unsigned_abs() as f64 / MS_PER_MINUTE).max(0.0)
}

fn passenger_score(a: u32, b: u32) -> f64 {
    if a == b { SAME_PARTY_SIZE_BONUS } else { 0.0 }
}

/// A scored partner for the entry being matched.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub position: usize,
    pub requested_at: DateTime<Utc>,
    pub score: u32,
}

impl Candidate {
    /// Higher score wins, then earlier request, then earlier arrival.
    fn beats(&self, other: &Candidate) -> bool {
        match self.score.cmp(&other.score) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                (self.requested_at, self.position) < (other.requested_at, other.position)
            }
        }
    }
}

pub fn pick_best(candidates: impl IntoIterator<Item = Candidate>) -> Option<Candidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(current) if !candidate.beats(&current) => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{compute_score, pick_best, Candidate};
    use crate::engine::compatibility::PairMetrics;
    use crate::models::location::Location;
    use crate::models::request::{RideRequest, VehicleType};

    fn ride(passengers: u32) -> RideRequest {
        let at = Utc::now();
        RideRequest {
            id: Uuid::new_v4(),
            pickup: Location::new("Colaba", 18.91, 72.81),
            dropoff: Location::new("Dadar", 19.02, 72.84),
            vehicle_type: VehicleType::Bike,
            passenger_count: passengers,
            requested_at: at,
            deadline: at + Duration::seconds(180),
        }
    }

    fn metrics(pickup_km: f64, dropoff_km: f64, time_diff_ms: i64) -> PairMetrics {
        PairMetrics {
            pickup_km,
            dropoff_km,
            time_diff_ms,
        }
    }

    #[test]
    fn close_simultaneous_same_size_pair_scores_highest() {
        let (score, breakdown) = compute_score(&ride(1), &ride(1), &metrics(1.0, 1.5, 10_000));

        assert_eq!(breakdown.distance_score, 75.0);
        assert_eq!(breakdown.passenger_score, 20.0);
        // 75 + (100 - 1/6) + 20
        assert_eq!(score, 195);
    }

    #[test]
    fn party_size_mismatch_loses_bonus() {
        let (same, _) = compute_score(&ride(2), &ride(2), &metrics(0.5, 0.5, 0));
        let (mixed, _) = compute_score(&ride(2), &ride(1), &metrics(0.5, 0.5, 0));
        assert_eq!(same - mixed, 20);
    }

    #[test]
    fn score_never_goes_negative() {
        let (score, breakdown) =
            compute_score(&ride(1), &ride(3), &metrics(40.0, 80.0, 9_000_000_000));
        assert_eq!(breakdown.distance_score, 0.0);
        assert_eq!(breakdown.time_score, 0.0);
        assert_eq!(score, 0);

        let (nan_score, _) = compute_score(&ride(1), &ride(1), &metrics(f64::NAN, 0.0, 0));
        assert_eq!(nan_score, 120);
    }

    #[test]
    fn ties_prefer_earlier_request_then_arrival() {
        let now = Utc::now();
        let early = Candidate {
            position: 3,
            requested_at: now - Duration::seconds(30),
            score: 150,
        };
        let late = Candidate {
            position: 1,
            requested_at: now,
            score: 150,
        };
        let same_time_later_arrival = Candidate {
            position: 5,
            requested_at: now - Duration::seconds(30),
            score: 150,
        };

        let best = pick_best([late, same_time_later_arrival, early]).unwrap();
        assert_eq!(best.position, 3);

        let stronger = Candidate { score: 151, ..late };
        assert_eq!(pick_best([early, stronger]).unwrap().position, 1);
        assert!(pick_best(Vec::new()).is_none());
    }
}
