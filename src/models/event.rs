use serde::{Deserialize, Serialize};

use crate::models::matching::Match;
use crate::models::request::QueueEntry;

/// Published to subscribers whenever a request reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum MatchingEvent {
    Matched(Match),
    TimedOut(QueueEntry),
}
