use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::MatchingConfig;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::scheduler::MatchingEngine;
use crate::models::event::MatchingEvent;
use crate::ports::{BroadcastNotifier, DistancePort, HaversineDistance};

pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub events_tx: broadcast::Sender<MatchingEvent>,
}

impl AppState {
    /// Production wiring: haversine distances, wall-clock time, and match
    /// events fanned out over a broadcast channel.
    pub fn new(matching: MatchingConfig, event_buffer_size: usize) -> Self {
        Self::with_ports(
            matching,
            event_buffer_size,
            Arc::new(HaversineDistance),
            Arc::new(SystemClock),
        )
    }

    pub fn with_ports(
        matching: MatchingConfig,
        event_buffer_size: usize,
        distance: Arc<dyn DistancePort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        let notifier = Arc::new(BroadcastNotifier::new(events_tx.clone()));

        Self {
            engine: Arc::new(MatchingEngine::new(matching, distance, notifier, clock)),
            events_tx,
        }
    }
}
