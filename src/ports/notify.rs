use tokio::sync::broadcast;

use crate::error::NotificationError;
use crate::models::event::MatchingEvent;
use crate::models::matching::Match;
use crate::models::request::QueueEntry;
use crate::ports::NotificationPort;

/// Fans terminal transitions out to every subscriber of a broadcast channel
/// (websocket clients in the service). No subscribers is not a failure.
#[derive(Clone)]
pub struct BroadcastNotifier {
    events_tx: broadcast::Sender<MatchingEvent>,
}

impl BroadcastNotifier {
    pub fn new(events_tx: broadcast::Sender<MatchingEvent>) -> Self {
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MatchingEvent> {
        self.events_tx.subscribe()
    }
}

impl NotificationPort for BroadcastNotifier {
    fn notify_matched(&self, record: &Match) -> Result<(), NotificationError> {
        let _ = self.events_tx.send(MatchingEvent::Matched(record.clone()));
        Ok(())
    }

    fn notify_timeout(&self, entry: &QueueEntry) -> Result<(), NotificationError> {
        let _ = self.events_tx.send(MatchingEvent::TimedOut(entry.clone()));
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationPort for NoopNotifier {
    fn notify_matched(&self, _record: &Match) -> Result<(), NotificationError> {
        Ok(())
    }

    fn notify_timeout(&self, _entry: &QueueEntry) -> Result<(), NotificationError> {
        Ok(())
    }
}
