//! Collaborators the engine depends on but does not implement.

pub mod distance;
pub mod notify;

use crate::error::{DistanceError, NotificationError};
use crate::models::location::Location;
use crate::models::matching::Match;
use crate::models::request::QueueEntry;

pub use distance::HaversineDistance;
pub use notify::{BroadcastNotifier, NoopNotifier};

/// Geographic distance between two locations, in kilometres.
///
/// May be expensive; the scheduler never calls it while holding the queue
/// lock. An error fails only the compatibility check it was made for.
pub trait DistancePort: Send + Sync {
    fn distance(&self, from: &Location, to: &Location) -> Result<f64, DistanceError>;
}

/// Told about terminal transitions after they are committed. Failures are
/// logged and never roll the transition back.
pub trait NotificationPort: Send + Sync {
    fn notify_matched(&self, record: &Match) -> Result<(), NotificationError>;

    fn notify_timeout(&self, entry: &QueueEntry) -> Result<(), NotificationError>;
}
