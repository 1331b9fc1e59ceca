use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub time_score: f64,
    pub passenger_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedRoute {
    pub pickup_order: Vec<Uuid>,
    pub dropoff_order: Vec<Uuid>,
}

/// Two ride requests committed to share one vehicle. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub request_a: Uuid,
    pub request_b: Uuid,
    pub score: u32,
    pub score_breakdown: ScoreBreakdown,
    pub status: MatchStatus,
    pub shared_route: SharedRoute,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(
        request_a: Uuid,
        request_b: Uuid,
        score: u32,
        score_breakdown: ScoreBreakdown,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_a,
            request_b,
            score,
            score_breakdown,
            status: MatchStatus::Confirmed,
            shared_route: SharedRoute {
                pickup_order: vec![request_a, request_b],
                dropoff_order: vec![request_a, request_b],
            },
            created_at,
        }
    }
}

/// What a caller sees when polling a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusView {
    NotFound,
    Queued {
        requested_at: DateTime<Utc>,
        attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        remaining_secs: i64,
    },
    Matching {
        requested_at: DateTime<Utc>,
        attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        remaining_secs: i64,
    },
    Matched {
        match_id: Uuid,
        matched_with: Uuid,
        at: DateTime<Utc>,
    },
    TimedOut {
        at: DateTime<Utc>,
    },
}
