use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::engine::clock::Clock;
use crate::models::audit::{AuditLevel, AuditLogEntry};

/// Bounded, append-only record of matching events.
///
/// Backed by a fixed-capacity ring: once full, each append evicts the oldest
/// entry. Every append is mirrored to `tracing` at the matching level.
/// Entries are stamped with the engine's clock.
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock,
        }
    }

    pub fn append(&self, level: AuditLevel, message: impl Into<String>, data: Value) {
        let message = message.into();

        match level {
            AuditLevel::Info | AuditLevel::Success => info!(%data, "{message}"),
            AuditLevel::Warning => warn!(%data, "{message}"),
            AuditLevel::Error => error!(%data, "{message}"),
        }

        let entry = AuditLogEntry {
            timestamp: self.clock.now(),
            level,
            message,
            data,
        };

        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn info(&self, message: impl Into<String>, data: Value) {
        self.append(AuditLevel::Info, message, data);
    }

    pub fn success(&self, message: impl Into<String>, data: Value) {
        self.append(AuditLevel::Success, message, data);
    }

    pub fn warning(&self, message: impl Into<String>, data: Value) {
        self.append(AuditLevel::Warning, message, data);
    }

    pub fn error(&self, message: impl Into<String>, data: Value) {
        self.append(AuditLevel::Error, message, data);
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panicking writer cannot leave the ring half-updated, so a poisoned
    // lock is still safe to read through.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
