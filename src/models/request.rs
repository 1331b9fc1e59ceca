use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Bike,
    Auto,
    Taxi,
    Car,
}

/// A ride request as submitted by a caller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRideRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub pickup: Option<Location>,
    #[serde(default)]
    pub dropoff: Option<Location>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default = "default_passenger_count")]
    pub passenger_count: u32,
}

fn default_passenger_count() -> u32 {
    1
}

impl Default for NewRideRequest {
    fn default() -> Self {
        Self {
            id: None,
            pickup: None,
            dropoff: None,
            vehicle_type: None,
            passenger_count: default_passenger_count(),
        }
    }
}

impl NewRideRequest {
    /// Checks required fields and stamps the request with its enqueue time and
    /// matching deadline.
    pub fn validate(
        self,
        requested_at: DateTime<Utc>,
        max_matching: Duration,
    ) -> Result<RideRequest, ValidationError> {
        let pickup = self
            .pickup
            .filter(|loc| !loc.is_blank())
            .ok_or(ValidationError::MissingPickup)?;
        let dropoff = self
            .dropoff
            .filter(|loc| !loc.is_blank())
            .ok_or(ValidationError::MissingDropoff)?;
        let vehicle_type = self.vehicle_type.ok_or(ValidationError::MissingVehicleType)?;

        if self.passenger_count < 1 {
            return Err(ValidationError::InvalidPassengerCount(self.passenger_count));
        }

        Ok(RideRequest {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            pickup,
            dropoff,
            vehicle_type,
            passenger_count: self.passenger_count,
            requested_at,
            deadline: requested_at + max_matching,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub pickup: Location,
    pub dropoff: Location,
    pub vehicle_type: VehicleType,
    pub passenger_count: u32,
    pub requested_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Queued,
    Matching,
    Matched,
    TimedOut,
}

impl EntryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryStatus::Matched | EntryStatus::TimedOut)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub request: RideRequest,
    pub status: EntryStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(request: RideRequest) -> Self {
        Self {
            request,
            status: EntryStatus::Queued,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.request.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.request.deadline
    }
}
