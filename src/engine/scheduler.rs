use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::engine::audit::AuditLog;
use crate::engine::clock::Clock;
use crate::engine::compatibility::{CompatibilityEvaluator, Evaluation, Incompatibility};
use crate::engine::queue::RequestQueue;
use crate::engine::scoring::{compute_score, pick_best, Candidate};
use crate::error::ValidationError;
use crate::models::audit::AuditLogEntry;
use crate::models::matching::{Match, ScoreBreakdown, StatusView};
use crate::models::request::{NewRideRequest, QueueEntry};
use crate::observability::metrics::Metrics;
use crate::ports::{DistancePort, NotificationPort};

/// What one matching pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub examined: usize,
    pub matched: usize,
    pub timed_out: usize,
    pub requeued: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub queue_size: usize,
    pub active_matches: usize,
    pub is_running: bool,
    pub total_logs: usize,
    pub processed: u64,
    pub timed_out: u64,
    pub config: MatchingConfig,
}

struct Runner {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Pairs queued ride requests on a fixed tick and reaps those that outlive
/// their deadline.
///
/// Ticks never overlap: the timer loop and `trigger_now` both go through the
/// same async mutex. Within a tick the queue lock is taken only for status
/// changes, and the pass itself runs on the blocking pool, so submissions and
/// status polls are never stuck behind distance lookups.
pub struct MatchingEngine {
    config: MatchingConfig,
    queue: RequestQueue,
    audit: Arc<AuditLog>,
    evaluator: CompatibilityEvaluator,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    matches: DashMap<Uuid, Match>,
    match_order: Mutex<VecDeque<Uuid>>,
    metrics: Metrics,
    tick_guard: tokio::sync::Mutex<()>,
    runner: Mutex<Option<Runner>>,
    processed: AtomicU64,
    timed_out: AtomicU64,
}

impl MatchingEngine {
    pub fn new(
        config: MatchingConfig,
        distance: Arc<dyn DistancePort>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit = Arc::new(AuditLog::new(config.audit_log_capacity, clock.clone()));

        Self {
            queue: RequestQueue::new(audit.clone(), config.outcome_retention),
            evaluator: CompatibilityEvaluator::new(config.clone(), distance),
            config,
            audit,
            notifier,
            clock,
            matches: DashMap::new(),
            match_order: Mutex::new(VecDeque::new()),
            metrics: Metrics::new(),
            tick_guard: tokio::sync::Mutex::new(()),
            runner: Mutex::new(None),
            processed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        }
    }

    pub fn submit(&self, request: NewRideRequest) -> Result<Uuid, ValidationError> {
        let now = self.clock.now();

        match self
            .queue
            .enqueue(request, now, self.config.max_matching_duration())
        {
            Ok(entry) => {
                self.metrics
                    .ride_requests_total
                    .with_label_values(&["accepted"])
                    .inc();
                self.metrics.rides_in_queue.set(self.queue.len() as i64);
                Ok(entry.id())
            }
            Err(err) => {
                self.metrics
                    .ride_requests_total
                    .with_label_values(&["rejected"])
                    .inc();
                self.audit.warning(
                    "ride request rejected",
                    json!({ "reason": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    pub fn status(&self, id: Uuid) -> StatusView {
        self.queue.status(id, self.clock.now())
    }

    /// Spawns the periodic matching loop. Must be called inside a tokio
    /// runtime; a second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut runner = self.lock_runner();
        if runner.is_some() {
            self.audit.info("background matching already running", json!({}));
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let period = self.config.tick_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.trigger_now().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        *runner = Some(Runner {
            shutdown_tx,
            handle,
        });

        self.audit.info(
            "starting background matching",
            json!({ "interval_ms": self.config.matching_interval_ms }),
        );
    }

    /// Halts the timer. A tick already in progress runs to completion first.
    pub async fn stop(&self) {
        let runner = self.lock_runner().take();

        let Some(runner) = runner else {
            self.audit.info("background matching not running", json!({}));
            return;
        };

        let _ = runner.shutdown_tx.send(true);
        if let Err(err) = runner.handle.await {
            self.audit.error(
                "matching loop ended abnormally",
                json!({ "error": err.to_string() }),
            );
        }

        self.audit.info("background matching stopped", json!({}));
    }

    pub fn is_running(&self) -> bool {
        self.lock_runner().is_some()
    }

    /// Runs one matching pass now. Waits for any pass already in flight.
    pub async fn trigger_now(self: &Arc<Self>) -> TickReport {
        let _guard = self.tick_guard.lock().await;

        let started = Instant::now();
        let engine = Arc::clone(self);
        let report = match tokio::task::spawn_blocking(move || engine.run_tick()).await {
            Ok(report) => report,
            Err(err) => {
                self.audit.error(
                    "matching pass aborted",
                    json!({ "error": err.to_string() }),
                );
                TickReport::default()
            }
        };
        self.metrics
            .tick_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        report
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            queue_size: self.queue.len(),
            active_matches: self.matches.len(),
            is_running: self.is_running(),
            total_logs: self.audit.len(),
            processed: self.processed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            config: self.config.clone(),
        }
    }

    pub fn recent_logs(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.audit.recent(limit)
    }

    pub fn clear_logs(&self) {
        self.audit.clear();
        self.audit.info("logs cleared", json!({}));
    }

    /// All committed matches, oldest first.
    pub fn matches(&self) -> Vec<Match> {
        let mut matches: Vec<Match> = self
            .matches
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|m| m.created_at);
        matches
    }

    pub fn get_match(&self, id: Uuid) -> Option<Match> {
        self.matches.get(&id).map(|entry| entry.value().clone())
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn run_tick(&self) -> TickReport {
        let snapshot = self.queue.snapshot();
        let mut report = TickReport::default();

        if snapshot.is_empty() {
            report.timed_out += self.sweep_expired();
            return report;
        }

        self.audit.info(
            "processing matching queue",
            json!({ "queue_size": snapshot.len() }),
        );

        let mut consumed: HashSet<Uuid> = HashSet::new();

        for (position, entry) in snapshot.iter().enumerate() {
            let id = entry.id();
            if consumed.contains(&id) || !self.queue.begin_matching(id) {
                continue;
            }
            report.examined += 1;
            self.audit.info(
                "attempting to match ride",
                json!({ "request_id": id, "attempts": entry.attempts }),
            );

            let partner = self.find_partner(position, entry, &snapshot, &consumed);
            let now = self.clock.now();

            match partner {
                Some((candidate, breakdown)) => {
                    let other = &snapshot[candidate.position];
                    if self.commit_match(entry, other, candidate.score, breakdown, now) {
                        consumed.insert(id);
                        consumed.insert(other.id());
                        report.matched += 1;
                    } else if let Some(updated) = self.queue.requeue(id, now) {
                        report.requeued += 1;
                        self.audit.info(
                            "ride returned to matching queue",
                            json!({
                                "request_id": id,
                                "attempts": updated.attempts,
                            }),
                        );
                    }
                }
                None if entry.is_expired(now) => {
                    consumed.insert(id);
                    if self.reap(id, now) {
                        report.timed_out += 1;
                    }
                }
                None => {
                    if let Some(updated) = self.queue.requeue(id, now) {
                        report.requeued += 1;
                        self.audit.info(
                            "no compatible rides found",
                            json!({
                                "request_id": id,
                                "attempts": updated.attempts,
                            }),
                        );
                    }
                }
            }
        }

        report.timed_out += self.sweep_expired();
        self.metrics.rides_in_queue.set(self.queue.len() as i64);

        report
    }

    fn find_partner(
        &self,
        position: usize,
        entry: &QueueEntry,
        snapshot: &[QueueEntry],
        consumed: &HashSet<Uuid>,
    ) -> Option<(Candidate, ScoreBreakdown)> {
        let mut scored: Vec<(Candidate, ScoreBreakdown)> = Vec::new();

        for (other_position, other) in snapshot.iter().enumerate() {
            if other_position == position || consumed.contains(&other.id()) {
                continue;
            }

            match self.evaluator.evaluate(&entry.request, &other.request) {
                Evaluation::Compatible(metrics) => {
                    let (score, breakdown) =
                        compute_score(&entry.request, &other.request, &metrics);
                    self.audit.info(
                        "compatible ride found",
                        json!({
                            "target_ride": entry.id(),
                            "compatible_ride": other.id(),
                            "score": score,
                        }),
                    );
                    scored.push((
                        Candidate {
                            position: other_position,
                            requested_at: other.request.requested_at,
                            score,
                        },
                        breakdown,
                    ));
                }
                Evaluation::Incompatible(Incompatibility::DistanceUnavailable(err)) => {
                    self.metrics
                        .port_failures_total
                        .with_label_values(&["distance"])
                        .inc();
                    self.audit.error(
                        "error checking ride compatibility",
                        json!({
                            "ride1": entry.id(),
                            "ride2": other.id(),
                            "error": err.to_string(),
                        }),
                    );
                }
                Evaluation::Incompatible(_) => {}
            }
        }

        let best = pick_best(scored.iter().map(|(candidate, _)| *candidate))?;
        scored
            .into_iter()
            .find(|(candidate, _)| candidate.position == best.position)
    }

    fn commit_match(
        &self,
        entry: &QueueEntry,
        partner: &QueueEntry,
        score: u32,
        breakdown: ScoreBreakdown,
        now: DateTime<Utc>,
    ) -> bool {
        let record = Match::new(entry.id(), partner.id(), score, breakdown, now);

        if let Err(err) = self.queue.commit_match(&record) {
            self.audit.error(
                "failed to create match",
                json!({
                    "ride1": entry.id(),
                    "ride2": partner.id(),
                    "error": err.to_string(),
                }),
            );
            return false;
        }

        self.store_match(record.clone());
        self.processed.fetch_add(2, Ordering::Relaxed);
        self.metrics.matches_total.inc();

        if let Err(err) = self.notifier.notify_matched(&record) {
            self.metrics
                .port_failures_total
                .with_label_values(&["notification"])
                .inc();
            self.audit.error(
                "failed to notify riders about match",
                json!({ "match_id": record.id, "error": err.to_string() }),
            );
        }

        self.audit.success(
            "match created successfully",
            json!({
                "match_id": record.id,
                "ride1": record.request_a,
                "ride2": record.request_b,
                "score": record.score,
            }),
        );

        true
    }

    fn reap(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.queue.expire(id, now) else {
            return false;
        };

        self.processed.fetch_add(1, Ordering::Relaxed);
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        self.metrics.timeouts_total.inc();

        if let Err(err) = self.notifier.notify_timeout(&entry) {
            self.metrics
                .port_failures_total
                .with_label_values(&["notification"])
                .inc();
            self.audit.error(
                "failed to notify rider about matching timeout",
                json!({ "request_id": id, "error": err.to_string() }),
            );
        }

        self.audit.warning(
            "ride matching timeout",
            json!({
                "request_id": id,
                "requested_at": entry.request.requested_at,
                "attempts": entry.attempts,
            }),
        );

        true
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let reaped = self
            .queue
            .expired_ids(now)
            .into_iter()
            .filter(|id| self.reap(*id, now))
            .count();

        if reaped > 0 {
            self.audit
                .info("cleaned up expired entries", json!({ "count": reaped }));
        }

        reaped
    }

    fn store_match(&self, record: Match) {
        let mut order = self.match_order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(record.id);
        self.matches.insert(record.id, record);

        while order.len() > self.config.outcome_retention.max(1) {
            if let Some(oldest) = order.pop_front() {
                self.matches.remove(&oldest);
            }
        }
    }

    fn lock_runner(&self) -> MutexGuard<'_, Option<Runner>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::MatchingEngine;
    use crate::config::MatchingConfig;
    use crate::engine::clock::{Clock, ManualClock};
    use crate::models::location::Location;
    use crate::models::matching::StatusView;
    use crate::models::request::{NewRideRequest, VehicleType};
    use crate::ports::{HaversineDistance, NoopNotifier};

    const KM_LAT: f64 = 1.0 / 111.19;

    fn engine() -> (Arc<MatchingEngine>, Arc<ManualClock>) {
        engine_with(MatchingConfig::default())
    }

    fn engine_with(config: MatchingConfig) -> (Arc<MatchingEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 7, 30, 0).unwrap(),
        ));
        let engine = MatchingEngine::new(
            config,
            Arc::new(HaversineDistance),
            Arc::new(NoopNotifier),
            clock.clone(),
        );
        (Arc::new(engine), clock)
    }

    fn bike_ride(id_seed: u128, pickup_offset_km: f64, passengers: u32) -> NewRideRequest {
        NewRideRequest {
            id: Some(Uuid::from_u128(id_seed)),
            pickup: Some(Location::new(
                "Juhu",
                19.10 + pickup_offset_km * KM_LAT,
                72.83,
            )),
            dropoff: Some(Location::new("Lower Parel", 18.99, 72.83)),
            vehicle_type: Some(VehicleType::Bike),
            passenger_count: passengers,
        }
    }

    #[tokio::test]
    async fn best_scoring_partner_wins() {
        let (engine, _clock) = engine();
        engine.submit(bike_ride(1, 0.0, 1)).unwrap();
        engine.submit(bike_ride(2, 1.5, 1)).unwrap();
        engine.submit(bike_ride(3, 0.2, 1)).unwrap();

        let report = engine.trigger_now().await;
        assert_eq!(report.matched, 1);

        let matches = engine.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].request_a, Uuid::from_u128(1));
        assert_eq!(matches[0].request_b, Uuid::from_u128(3));
        assert!(matches!(
            engine.status(Uuid::from_u128(2)),
            StatusView::Queued { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn equal_scores_prefer_earlier_arrival() {
        let (engine, clock) = engine();
        engine.submit(bike_ride(1, 0.0, 1)).unwrap();
        clock.advance(Duration::seconds(60));
        // Same distance from the anchor on either side, same submit time.
        engine.submit(bike_ride(2, 0.5, 1)).unwrap();
        engine.submit(bike_ride(3, -0.5, 1)).unwrap();

        engine.trigger_now().await;

        let matches = engine.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].request_b, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn stale_request_with_partner_is_still_matched() {
        let (engine, clock) = engine();
        engine.submit(bike_ride(1, 0.0, 2)).unwrap();
        clock.advance(Duration::seconds(170));
        engine.submit(bike_ride(2, 0.3, 2)).unwrap();
        clock.advance(Duration::seconds(20));

        let report = engine.trigger_now().await;
        assert_eq!(report.matched, 1);
        assert_eq!(report.timed_out, 0);
        assert_eq!(engine.stats().processed, 2);
    }

    #[tokio::test]
    async fn clear_logs_leaves_single_marker() {
        let (engine, _clock) = engine();
        engine.submit(bike_ride(1, 0.0, 1)).unwrap();
        engine.clear_logs();

        let logs = engine.recent_logs(10);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "logs cleared");
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (engine, _clock) = engine();

        engine.start();
        engine.start();
        assert!(engine.is_running());
        assert!(engine.stats().is_running);

        engine.stop().await;
        engine.stop().await;
        assert!(!engine.is_running());

        let messages: Vec<String> = engine
            .recent_logs(10)
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert!(messages.contains(&"background matching already running".to_string()));
        assert!(messages.contains(&"background matching not running".to_string()));
    }

    #[tokio::test]
    async fn audit_entries_follow_engine_clock() {
        let (engine, clock) = engine();
        let submitted_at = clock.now();
        engine.submit(bike_ride(1, 0.0, 1)).unwrap();

        clock.advance(Duration::seconds(181));
        let report = engine.trigger_now().await;
        assert_eq!(report.timed_out, 1);

        let logs = engine.recent_logs(100);
        let queued = logs
            .iter()
            .find(|entry| entry.message == "ride added to matching queue")
            .unwrap();
        let timed_out = logs
            .iter()
            .find(|entry| entry.message == "ride matching timeout")
            .unwrap();
        assert_eq!(queued.timestamp, submitted_at);
        assert_eq!(timed_out.timestamp, clock.now());
    }

    #[tokio::test]
    async fn each_attempt_is_audited() {
        let (engine, _clock) = engine();
        engine.submit(bike_ride(1, 0.0, 1)).unwrap();
        engine.trigger_now().await;

        let messages: Vec<String> = engine
            .recent_logs(10)
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        let attempt = messages
            .iter()
            .position(|m| m == "attempting to match ride")
            .unwrap();
        let requeued = messages
            .iter()
            .position(|m| m == "no compatible rides found")
            .unwrap();
        // Newest first.
        assert!(requeued < attempt);
    }

    #[tokio::test]
    async fn oldest_matches_are_dropped_past_retention() {
        let (engine, _clock) = engine_with(MatchingConfig {
            outcome_retention: 1,
            ..MatchingConfig::default()
        });

        engine.submit(bike_ride(1, 0.0, 1)).unwrap();
        engine.submit(bike_ride(2, 0.1, 1)).unwrap();
        engine.trigger_now().await;
        let first = engine.matches()[0].id;

        engine.submit(bike_ride(3, 0.0, 1)).unwrap();
        engine.submit(bike_ride(4, 0.1, 1)).unwrap();
        engine.trigger_now().await;

        let matches = engine.matches();
        assert_eq!(matches.len(), 1);
        assert_ne!(matches[0].id, first);
        assert!(engine.get_match(first).is_none());
        assert_eq!(engine.status(Uuid::from_u128(1)), StatusView::NotFound);
    }
}
